//! Property tests for signing, client ids and order-ack correlation.

use okx_connect::exchanges::codec::{decode_order_response, encode_order};
use okx_connect::exchanges::FrameDecoder;
use okx_connect::{Action, Event, Order, Signer, TradingMode};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashSet;

const SECRET: &str = "22582BD0CFF14C41EDBF1AB98506286D";

fn http_method() -> impl Strategy<Value = String> {
    prop_oneof![Just("GET".to_string()), Just("POST".to_string())]
}

proptest! {
    #[test]
    fn signing_is_deterministic(
        method in http_method(),
        path in "/api/v5/[a-z/-]{1,30}",
        body in ".{0,64}",
        ts in "[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9:.]{12}Z",
    ) {
        let signer = Signer::new(SECRET).unwrap();
        let first = signer.sign(&method, &path, &body, &ts);
        let second = Signer::new(SECRET).unwrap().sign(&method, &path, &body, &ts);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn signing_depends_on_every_input(
        path in "/api/v5/[a-z]{1,20}",
        body in "[a-z0-9]{0,32}",
        ts in "[0-9]{10}",
        suffix in "[a-z0-9]{1,4}",
    ) {
        let signer = Signer::new(SECRET).unwrap();
        let base = signer.sign("GET", &path, &body, &ts);

        prop_assert_ne!(&base, &signer.sign("POST", &path, &body, &ts));
        prop_assert_ne!(&base, &signer.sign("GET", &format!("{}{}", path, suffix), &body, &ts));
        prop_assert_ne!(&base, &signer.sign("GET", &path, &format!("{}{}", body, suffix), &ts));
        prop_assert_ne!(&base, &signer.sign("GET", &path, &body, &format!("{}{}", ts, suffix)));
        prop_assert_ne!(&base, &Signer::new("another-secret").unwrap().sign("GET", &path, &body, &ts));
    }

    #[test]
    fn order_ack_correlates_to_client_id(
        size in 0.001f64..1_000.0,
        buy in any::<bool>(),
        ord_id in "[0-9]{6,18}",
    ) {
        let action = if buy { Action::Buy } else { Action::Sell };
        let order = Order::market(action, "BTC-USDT-SWAP", size, TradingMode::Cross);

        let request: Value = serde_json::from_str(&encode_order(&order)).unwrap();
        let ack = json!({
            "id": request["id"],
            "op": "order",
            "code": "0",
            "msg": "",
            "data": [{"ordId": ord_id, "clOrdId": request["args"][0]["clOrdId"], "sCode": "0", "sMsg": ""}]
        });
        let response = decode_order_response(&ack.to_string()).unwrap();

        prop_assert_eq!(response.id.as_str(), order.id());
        prop_assert_eq!(response.client_order_id.as_deref(), Some(order.id()));
        prop_assert_eq!(response.order_id.as_deref(), Some(ord_id.as_str()));
    }

    #[test]
    fn account_decoding_is_stateless(usdt in 0.0f64..1e6, btc_usd in 0.0f64..1e6) {
        let frame = json!({
            "arg": {"channel": "account"},
            "data": [{
                "uTime": "1597026383085",
                "details": [
                    {"ccy": "USDT", "eq": usdt.to_string(), "eqUsd": usdt.to_string()},
                    {"ccy": "BTC", "eq": "0.01", "eqUsd": btc_usd.to_string()}
                ]
            }]
        })
        .to_string();

        let decoder = FrameDecoder::new("USDT");
        let first = decoder.decode(&frame).unwrap();
        let second = decoder.decode(&frame).unwrap();
        prop_assert_eq!(&first, &second);

        match &first[..] {
            [Event::Account(account)] => {
                prop_assert!((account.in_coins_usd - btc_usd).abs() < 1e-6);
                prop_assert!((account.total_usd - (usdt + btc_usd)).abs() < 1e-6);
            }
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }
}

#[test]
fn client_ids_are_unique() {
    let ids: HashSet<String> = (0..100_000)
        .map(|_| Order::market(Action::Buy, "BTC-USDT", 1.0, TradingMode::Cash).id().to_string())
        .collect();
    assert_eq!(ids.len(), 100_000);
}
