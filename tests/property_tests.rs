//! Property-based tests for the stock ledger, deduction engine and status rules.
//!
//! The database-backed properties run against a fresh in-memory SQLite
//! database per case, so they use a small case count.

mod common;

use common::TestApp;
use proptest::prelude::*;
use rust_decimal::Decimal;
use sitestock_api::{
    entities::{item::SupplyChannel, FulfillmentStatus},
    errors::ServiceError,
    models::{ChannelKey, FulfillmentAction},
    services::{
        deduction::material_quantity,
        fulfillment::{derive_overall_status, plan_transition, TransitionContext, TransitionPolicy},
        orders::{NewOrder, NewOrderLine},
    },
};

fn status_strategy() -> impl Strategy<Value = FulfillmentStatus> {
    prop_oneof![
        Just(FulfillmentStatus::Pending),
        Just(FulfillmentStatus::Approved),
        Just(FulfillmentStatus::OutForDelivery),
        Just(FulfillmentStatus::InTransit),
        Just(FulfillmentStatus::Delivered),
        Just(FulfillmentStatus::Rejected),
        Just(FulfillmentStatus::Cancelled),
    ]
}

fn action_strategy() -> impl Strategy<Value = FulfillmentAction> {
    prop_oneof![
        Just(FulfillmentAction::Approve),
        Just(FulfillmentAction::Reject),
        Just(FulfillmentAction::Cancel),
        Just(FulfillmentAction::OutForDelivery),
        Just(FulfillmentAction::InTransit),
        Just(FulfillmentAction::Deliver),
        Just(FulfillmentAction::Receive),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn material_quantity_rounds_down(hundredths in 1i64..10_000, quantity in 1i64..10_000) {
        let per_unit = Decimal::new(hundredths, 2);
        let whole = material_quantity(per_unit, quantity).unwrap();
        prop_assert!(whole * 100 <= hundredths * quantity);
        prop_assert!((whole + 1) * 100 > hundredths * quantity);
    }

    #[test]
    fn no_transition_leaves_a_terminal_status(
        from in status_strategy(),
        action in action_strategy(),
        locked in any::<bool>(),
    ) {
        let policy = TransitionPolicy { lock_approved_channels: locked };
        if let Ok(plan) = plan_transition(from, action, &policy) {
            if from.is_terminal() {
                prop_assert!(plan.duplicate);
            }
            if !plan.duplicate {
                prop_assert_ne!(plan.to, FulfillmentStatus::Pending);
            }
        }
    }

    #[test]
    fn any_rejected_channel_rejects_the_order(
        statuses in prop::collection::vec(status_strategy(), 0..6),
    ) {
        let overall = derive_overall_status(statuses.iter().copied());
        if statuses.contains(&FulfillmentStatus::Rejected) {
            prop_assert_eq!(overall, FulfillmentStatus::Rejected);
        } else if !statuses.is_empty()
            && statuses.iter().all(|status| *status == FulfillmentStatus::Cancelled)
        {
            prop_assert_eq!(overall, FulfillmentStatus::Cancelled);
        } else {
            prop_assert_ne!(overall, FulfillmentStatus::Rejected);
            prop_assert_ne!(overall, FulfillmentStatus::Cancelled);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn approvals_never_overdraw_and_rejections_restore_everything(
        general in 0i64..30,
        on_site in 0i64..10,
        material_stock in 0i64..60,
        quantities in prop::collection::vec(1i64..8, 1..5),
    ) {
        let rt = runtime();
        let result: Result<(), TestCaseError> = rt.block_on(async {
            let app = TestApp::new().await;
            let product = app.product("PANEL", SupplyChannel::Hardware, general).await;
            let screws = app.material("SCREWS", material_stock).await;
            app.set_bom(product.id, &[(screws.id, Decimal::new(15, 1))]).await;
            if on_site > 0 {
                app.stock_in(product.id, on_site, Some(1)).await;
            }

            let mut approved = Vec::new();
            let mut product_used = 0;
            let mut screws_used = 0;
            for quantity in quantities {
                let created = app
                    .services()
                    .orders
                    .create_order(NewOrder {
                        site_id: Some(1),
                        lines: vec![NewOrderLine::regular(product.id, quantity)],
                    })
                    .await
                    .unwrap();
                let result = app
                    .services()
                    .fulfillment
                    .transition(
                        created.order.id,
                        ChannelKey::Hardware,
                        FulfillmentAction::Approve,
                        TransitionContext::default(),
                    )
                    .await;
                match result {
                    Ok(_) => {
                        approved.push(created.order.id);
                        product_used += quantity;
                        screws_used += material_quantity(Decimal::new(15, 1), quantity).unwrap();
                    }
                    Err(ServiceError::InsufficientStock(_)) => {}
                    Err(other) => return Err(TestCaseError::fail(other.to_string())),
                }

                let site = app.balance(product.id, Some(1)).await;
                let shared = app.balance(product.id, None).await;
                let materials = app.balance(screws.id, None).await;
                prop_assert!(site >= 0 && shared >= 0 && materials >= 0);
                prop_assert_eq!(site + shared, general + on_site - product_used);
                prop_assert_eq!(materials, material_stock - screws_used);
            }

            for order_id in approved {
                app.services()
                    .fulfillment
                    .transition(
                        order_id,
                        ChannelKey::Hardware,
                        FulfillmentAction::Reject,
                        TransitionContext::default(),
                    )
                    .await
                    .unwrap();
            }

            prop_assert_eq!(app.balance(product.id, None).await, general);
            prop_assert_eq!(app.balance(product.id, Some(1)).await, on_site);
            prop_assert_eq!(app.balance(screws.id, None).await, material_stock);
            Ok(())
        });
        result?;
    }
}
