//! Buylist CLI - drive a buylist session from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # List, create and inspect carts
//! buylist carts list
//! buylist carts create "Binder sell-off"
//! buylist carts show 4
//!
//! # Add two Alpha Forests to cart 4
//! buylist quantity 4 --game MTG --name Forest --set Alpha --rarity Common \
//!     --condition "Near Mint" 2
//!
//! # Compare vendor offers, then submit one
//! buylist offers 4
//! buylist submit 4 card-kingdom --payment cash --accept-terms
//! ```
//!
//! # Commands
//!
//! - `carts` - List, create, rename, delete and show carts
//! - `quantity` - Change the quantity of one card in a cart
//! - `offers` - Per-vendor offers for a cart
//! - `vendors` - Vendors with a linked account
//! - `submit` - Submit a cart to a vendor
//!
//! Configuration comes from the environment (see `buylist_client::config`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use buylist_client::{BuylistError, BuylistSession, ClientConfig};
use buylist_core::{CardIdentity, CartId, PaymentMethod, VendorSlug};
use clap::{Args, Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "buylist")]
#[command(author, version, about = "Sell trading cards to the vendor paying the most")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage carts
    Carts {
        #[command(subcommand)]
        action: CartsAction,
    },
    /// Change the quantity of one card in a cart
    Quantity {
        /// Cart id
        cart: CartId,

        #[command(flatten)]
        card: CardArgs,

        /// Signed change, e.g. 2 or -1
        #[arg(allow_negative_numbers = true)]
        delta: i32,

        /// Treat the number as the new quantity instead of a change
        #[arg(long)]
        absolute: bool,
    },
    /// Show every vendor's offer for a cart
    Offers {
        /// Cart id
        cart: CartId,
    },
    /// List vendors the account is linked with
    Vendors,
    /// Submit a cart to a vendor
    Submit {
        /// Cart id
        cart: CartId,

        /// Vendor slug, e.g. `card-kingdom`
        vendor: String,

        /// How the vendor pays (`cash` or `store-credit`)
        #[arg(short, long)]
        payment: Option<PaymentMethod>,

        /// Accept the vendor's terms and cancellation rights
        #[arg(long)]
        accept_terms: bool,
    },
}

#[derive(Subcommand)]
enum CartsAction {
    /// List carts
    List,
    /// Create an empty cart
    Create {
        /// Cart name (at most 40 characters)
        name: String,
    },
    /// Rename a cart
    Rename {
        /// Cart id
        cart: CartId,
        /// New name
        name: String,
    },
    /// Delete a cart
    Delete {
        /// Cart id
        cart: CartId,
    },
    /// Show a cart's lines
    Show {
        /// Cart id
        cart: CartId,
    },
}

/// Composite identity of a card line.
#[derive(Args)]
struct CardArgs {
    /// Game, e.g. `MTG`
    #[arg(long)]
    game: String,

    /// Card name
    #[arg(short, long)]
    name: String,

    /// Set name
    #[arg(short, long)]
    set: String,

    #[arg(short, long)]
    rarity: String,

    /// Condition, e.g. "Near Mint"
    #[arg(short, long)]
    condition: String,

    #[arg(long)]
    foil: bool,
}

impl From<CardArgs> for CardIdentity {
    fn from(card: CardArgs) -> Self {
        Self::new(
            card.game,
            card.name,
            card.set,
            card.rarity,
            card.condition,
            card.foil,
        )
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = ClientConfig::from_env();

    // Initialize Sentry before tracing so the layer has a client to report to
    let sentry_guard = config.as_ref().ok().and_then(init_sentry);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "buylist_client=info,buylist_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result: Result<(), Box<dyn std::error::Error>> = match config {
        Ok(config) => run(cli, &config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        if is_retryable(e.as_ref()) {
            tracing::info!("This failure may be temporary; run the command again");
        }
        // exit() skips destructors; flush Sentry first
        drop(sentry_guard);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let session = BuylistSession::connect(config)?;

    match cli.command {
        Commands::Carts { action } => match action {
            CartsAction::List => commands::carts::list(&session).await?,
            CartsAction::Create { name } => commands::carts::create(&session, &name).await?,
            CartsAction::Rename { cart, name } => {
                commands::carts::rename(&session, cart, &name).await?;
            }
            CartsAction::Delete { cart } => commands::carts::delete(&session, cart).await?,
            CartsAction::Show { cart } => commands::carts::show(&session, cart).await?,
        },
        Commands::Quantity {
            cart,
            card,
            delta,
            absolute,
        } => {
            let identity = CardIdentity::from(card);
            if absolute {
                commands::quantity::set(&session, cart, &identity, delta).await?;
            } else {
                commands::quantity::adjust(&session, cart, &identity, delta).await?;
            }
        }
        Commands::Offers { cart } => commands::offers::show(&session, cart).await?,
        Commands::Vendors => commands::vendors::list(&session).await?,
        Commands::Submit {
            cart,
            vendor,
            payment,
            accept_terms,
        } => {
            let vendor = VendorSlug::new(vendor);
            commands::submit::submit(&session, cart, &vendor, payment, accept_terms).await?;
        }
    }
    Ok(())
}

/// Initialize Sentry error tracking.
///
/// Returns a guard that must be kept alive for the duration of the program.
/// Whether a failed command may succeed when run again.
fn is_retryable(err: &(dyn std::error::Error + 'static)) -> bool {
    err.downcast_ref::<BuylistError>()
        .is_some_and(BuylistError::is_retryable)
}

fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events for Sentry.
///
/// - ERROR and WARN become Sentry events
/// - INFO and DEBUG become breadcrumbs
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        tracing::Level::TRACE => sentry_tracing::EventFilter::Ignore,
    }
}
