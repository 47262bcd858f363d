//! `HttpBackend` against the fake backend over real HTTP.

#![allow(clippy::unwrap_used)]

use buylist_client::backend::{ItemUpdate, SubmitRequest};
use buylist_client::{BackendError, BuylistBackend, HttpBackend};
use buylist_core::{CardIdentity, CartName, PaymentMethod, VendorSlug};
use buylist_integration_tests::{FakeBuylistServer, Injected, Quote, Route};
use rust_decimal::Decimal;
use secrecy::SecretString;
use uuid::Uuid;

fn forest() -> CardIdentity {
    CardIdentity::new("MTG", "Forest", "Alpha", "Common", "Near Mint", false)
}

fn backend(server: &FakeBuylistServer) -> HttpBackend {
    HttpBackend::new(&server.client_config().backend).unwrap()
}

#[tokio::test]
async fn test_cart_crud_round_trip() {
    let server = FakeBuylistServer::start().await.unwrap();
    let backend = backend(&server);

    let cart = backend
        .create_cart(&CartName::parse("Lands").unwrap())
        .await
        .unwrap();
    assert!(cart.items.is_empty());

    let renamed = backend
        .rename_cart(cart.id, &CartName::parse("Basic lands").unwrap())
        .await
        .unwrap();
    assert_eq!(renamed.name.as_str(), "Basic lands");

    let carts = backend.list_carts().await.unwrap();
    assert_eq!(carts.len(), 1);
    assert_eq!(carts[0].id, cart.id);

    backend.delete_cart(cart.id).await.unwrap();
    assert!(matches!(
        backend.get_cart(cart.id).await,
        Err(BackendError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_item_updates_set_and_remove_lines() {
    let server = FakeBuylistServer::start().await.unwrap();
    let backend = backend(&server);
    let cart = backend
        .create_cart(&CartName::parse("Lands").unwrap())
        .await
        .unwrap();

    for quantity in [3, 2] {
        backend
            .update_item(
                cart.id,
                &ItemUpdate {
                    identity: forest(),
                    quantity,
                },
            )
            .await
            .unwrap();
    }
    let persisted = backend.get_cart(cart.id).await.unwrap();
    assert_eq!(persisted.items.len(), 1);
    assert_eq!(persisted.items[0].quantity, 2);

    backend
        .update_item(
            cart.id,
            &ItemUpdate {
                identity: forest(),
                quantity: 0,
            },
        )
        .await
        .unwrap();
    assert!(backend.get_cart(cart.id).await.unwrap().items.is_empty());
}

#[tokio::test]
async fn test_offers_wire_format() {
    let server = FakeBuylistServer::start().await.unwrap();
    server.quote(
        "vendor-b",
        "Forest",
        Quote {
            cash: Decimal::new(150, 2),
            credit: Decimal::new(100, 2),
            max_quantity: Some(1),
        },
    );
    let backend = backend(&server);
    let cart = backend
        .create_cart(&CartName::parse("Lands").unwrap())
        .await
        .unwrap();
    backend
        .update_item(
            cart.id,
            &ItemUpdate {
                identity: forest(),
                quantity: 2,
            },
        )
        .await
        .unwrap();

    let offers = backend.get_offers(cart.id).await.unwrap();
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].vendor_slug, VendorSlug::new("vendor-b"));
    let line = &offers[0].purchasable_lines[0];
    assert_eq!(line.card_identity, forest());
    assert_eq!(line.cash_price, Some(Decimal::new(150, 2)));
    assert_eq!(line.purchase_quantity, 1);
    assert_eq!(line.unable_to_purchase_quantity, 1);
    assert!(line.is_best_cash_offer);
}

#[tokio::test]
async fn test_rate_limit_exposes_retry_after() {
    let server = FakeBuylistServer::start().await.unwrap();
    server.fail_next(Route::ListCarts, [Injected::RateLimited(7)]);
    let backend = backend(&server);

    let err = backend.list_carts().await.unwrap_err();
    assert!(matches!(err, BackendError::RateLimited(7)));
    assert!(err.is_transient());
    assert!(backend.list_carts().await.is_ok());
}

#[tokio::test]
async fn test_status_classification() {
    let server = FakeBuylistServer::start().await.unwrap();
    server.fail_next(
        Route::ListCarts,
        [Injected::Status(503), Injected::Status(422)],
    );
    let backend = backend(&server);

    let unavailable = backend.list_carts().await.unwrap_err();
    assert!(matches!(unavailable, BackendError::Api { status: 503, .. }));
    assert!(unavailable.is_transient());

    let invalid = backend.list_carts().await.unwrap_err();
    assert!(matches!(invalid, BackendError::Api { status: 422, .. }));
    assert!(!invalid.is_transient());
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let server = FakeBuylistServer::start().await.unwrap();
    server.require_token("s3cret-buylist-token");

    let anonymous = backend(&server);
    assert!(matches!(
        anonymous.list_carts().await,
        Err(BackendError::Unauthorized(_))
    ));

    let mut config = server.client_config().backend;
    config.api_token = Some(SecretString::from("s3cret-buylist-token".to_string()));
    let authorized = HttpBackend::new(&config).unwrap();
    assert!(authorized.list_carts().await.is_ok());
}

#[tokio::test]
async fn test_submission_carries_correlation_id() {
    let server = FakeBuylistServer::start().await.unwrap();
    let backend = backend(&server);
    let cart = backend
        .create_cart(&CartName::parse("Lands").unwrap())
        .await
        .unwrap();

    let submission_id = Uuid::new_v4();
    let response = backend
        .submit_buylist(&SubmitRequest {
            cart_id: cart.id,
            vendor_slug: VendorSlug::new("vendor-a"),
            payment_method: PaymentMethod::StoreCredit,
            submission_id,
        })
        .await
        .unwrap();
    assert!(response.success);

    let submissions = server.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(
        submissions[0].submission_id,
        Some(submission_id.to_string())
    );
    assert_eq!(submissions[0].payment_method, PaymentMethod::StoreCredit);
}

#[tokio::test]
async fn test_commercial_rejection_is_a_response() {
    let server = FakeBuylistServer::start().await.unwrap();
    server.reject_submissions("Vendor is not buying Alpha this week");
    let backend = backend(&server);

    let response = backend
        .submit_buylist(&SubmitRequest {
            cart_id: buylist_core::CartId::new(1),
            vendor_slug: VendorSlug::new("vendor-a"),
            payment_method: PaymentMethod::Cash,
            submission_id: Uuid::new_v4(),
        })
        .await
        .unwrap();
    assert!(!response.success);
    assert_eq!(response.message, "Vendor is not buying Alpha this week");
}
