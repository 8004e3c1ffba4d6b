//! Protocol layer tests: notification construction, wire format, socket messages.

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use jf_protocol::*;
    use serde_json::json;

    fn fixed_now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    // ─────────────────────────────────────────────────────────────────────
    // NotificationType
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn type_parses_all_variants() {
        for kind in NotificationType::ALL {
            assert_eq!(kind.as_str().parse::<NotificationType>().unwrap(), kind);
        }
    }

    #[test]
    fn type_rejects_unknown() {
        let err = "urgent".parse::<NotificationType>().unwrap_err();
        assert_eq!(err, ProtocolError::UnknownType("urgent".into()));
        assert_eq!(err.to_string(), "Invalid notification type: urgent");
    }

    #[test]
    fn type_defaults_to_info() {
        assert_eq!(NotificationType::default(), NotificationType::Info);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Construction defaults
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn defaults_without_options() {
        let n = Notification::build_at("T", "D", NotificationType::default(), NotificationOptions::new(), fixed_now());
        assert_eq!(n.kind, NotificationType::Info);
        assert!(!n.actionable);
        assert_eq!(n.link, "");
        assert_eq!(n.source, DEFAULT_SOURCE);
        assert_eq!(n.source, "jaysframes-web");
        assert_eq!(n.source_id, format!("notification-{}", fixed_now().timestamp_millis()));
        assert_eq!(n.timestamp, fixed_now());
        assert!(n.id.is_none());
        assert!(n.extra.is_empty());
    }

    #[test]
    fn typed_options_override_defaults() {
        let ts = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let opts = NotificationOptions::new()
            .source("orders-app")
            .source_id("12345")
            .actionable(true)
            .link("/orders/12345")
            .timestamp(ts);
        let n = Notification::build_at("New Order", "8x10 frame", NotificationType::Success, opts, fixed_now());
        assert_eq!(n.source, "orders-app");
        assert_eq!(n.source_id, "12345");
        assert!(n.actionable);
        assert_eq!(n.link, "/orders/12345");
        assert_eq!(n.timestamp, ts);
    }

    #[test]
    fn extra_fields_override_known_fields() {
        let opts = NotificationOptions::new()
            .source("typed")
            .field("source", "extra-wins")
            .field("timestamp", "2022-02-02T02:02:02.000Z")
            .field("type", "error")
            .field("actionable", true);
        let n = Notification::build_at("T", "D", NotificationType::Info, opts, fixed_now());
        assert_eq!(n.source, "extra-wins");
        assert_eq!(n.timestamp_iso(), "2022-02-02T02:02:02.000Z");
        assert_eq!(n.kind, NotificationType::Error);
        assert!(n.actionable);
        assert!(n.extra.is_empty());
    }

    #[test]
    fn extra_fields_with_wrong_type_are_ignored() {
        let opts = NotificationOptions::new()
            .field("actionable", "yes")
            .field("type", "urgent");
        let n = Notification::build_at("T", "D", NotificationType::Warning, opts, fixed_now());
        assert!(!n.actionable);
        assert_eq!(n.kind, NotificationType::Warning);
        assert!(n.extra.is_empty());
    }

    #[test]
    fn invalid_known_fields_keep_defaults() {
        let opts = NotificationOptions::new()
            .link("/orders/1")
            .field("timestamp", "yesterday")
            .field("link", serde_json::Value::Null)
            .field("sourceId", 12);
        let n = Notification::build_at("T", "D", NotificationType::Info, opts, fixed_now());
        assert_eq!(n.timestamp, fixed_now());
        assert_eq!(n.link, "/orders/1");
        assert_eq!(n.source_id, format!("notification-{}", fixed_now().timestamp_millis()));
        assert!(n.extra.is_empty());
    }

    #[test]
    fn unknown_extra_fields_are_preserved() {
        let opts = NotificationOptions::new()
            .field("orderId", 42)
            .field("smsEnabled", true);
        let n = Notification::build_at("T", "D", NotificationType::Info, opts, fixed_now());
        assert_eq!(n.extra["orderId"], 42);
        assert_eq!(n.extra["smsEnabled"], true);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Wire format
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn serializes_camel_case_with_flattened_extras() {
        let opts = NotificationOptions::new().source_id("inv-1").field("orderId", 7);
        let n = Notification::build_at("Low stock", "5 left", NotificationType::Warning, opts, fixed_now());
        let json = n.to_json();
        assert_eq!(json["type"], "warning");
        assert_eq!(json["sourceId"], "inv-1");
        assert_eq!(json["timestamp"], "2024-05-01T12:30:00.000Z");
        assert_eq!(json["orderId"], 7);
        assert!(json.get("id").is_none());
        assert!(json.get("extra").is_none());
    }

    #[test]
    fn deserializes_server_record() {
        let wire = r#"{"id":"1","title":"New Order Received","description":"8x10","source":"orders-app","sourceId":"12345","type":"success","timestamp":"2024-05-01T12:30:00.000Z","actionable":true,"link":"/orders/12345","smsEnabled":false}"#;
        let n: Notification = serde_json::from_str(wire).unwrap();
        assert_eq!(n.id.as_deref(), Some("1"));
        assert_eq!(n.kind, NotificationType::Success);
        assert_eq!(n.timestamp, fixed_now());
        assert_eq!(n.extra["smsEnabled"], false);
    }

    #[test]
    fn rejects_bad_timestamp() {
        let wire = json!({
            "title": "T", "description": "D", "source": "s", "sourceId": "",
            "timestamp": "yesterday",
        });
        assert!(serde_json::from_value::<Notification>(wire).is_err());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Inbound payload validation
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn payload_requires_title_and_description() {
        let p = NotificationPayload::from_json(json!({"title": "T"})).unwrap();
        assert_eq!(
            p.into_notification("id-1".into(), "api", fixed_now()).unwrap_err(),
            ProtocolError::MissingContent,
        );

        let p = NotificationPayload::from_json(json!({"title": "", "description": "D"})).unwrap();
        assert!(p.into_notification("id-1".into(), "api", fixed_now()).is_err());
    }

    #[test]
    fn payload_rejects_unknown_type() {
        let p = NotificationPayload::from_json(json!({"title": "T", "description": "D", "type": "urgent"})).unwrap();
        assert!(matches!(
            p.into_notification("id-1".into(), "api", fixed_now()),
            Err(ProtocolError::UnknownType(t)) if t == "urgent"
        ));
    }

    #[test]
    fn unknown_type_reply_omits_the_value() {
        let err = ProtocolError::UnknownType("urgent".into());
        assert_eq!(err.client_message(), "Invalid notification type");
        assert_eq!(ProtocolError::MissingContent.client_message(), "Title and description are required");
    }

    #[test]
    fn payload_empty_type_defaults_to_info() {
        let p = NotificationPayload::from_json(json!({"title": "T", "description": "D", "type": ""})).unwrap();
        let n = p.into_notification("id-1".into(), "api", fixed_now()).unwrap();
        assert_eq!(n.kind, NotificationType::Info);
    }

    #[test]
    fn payload_rejects_non_object() {
        assert!(matches!(
            NotificationPayload::from_json(json!(["T", "D"])),
            Err(ProtocolError::InvalidPayload(_))
        ));
    }

    #[test]
    fn payload_fills_endpoint_defaults() {
        let p = NotificationPayload::from_json(json!({
            "id": "client-chosen",
            "title": "T",
            "description": "D",
            "smsRecipient": "+15550100",
        })).unwrap();
        let n = p.into_notification("server-id".into(), "api", fixed_now()).unwrap();
        assert_eq!(n.id.as_deref(), Some("server-id"));
        assert_eq!(n.source, "api");
        assert_eq!(n.source_id, "");
        assert_eq!(n.kind, NotificationType::Info);
        assert_eq!(n.timestamp, fixed_now());
        assert_eq!(n.extra["smsRecipient"], "+15550100");
        assert!(!n.extra.contains_key("id"));
    }

    #[test]
    fn payload_keeps_client_timestamp() {
        let p = NotificationPayload::from_json(json!({
            "title": "T", "description": "D", "timestamp": "2020-01-01T00:00:00.000Z",
        })).unwrap();
        let n = p.into_notification("x".into(), "api", fixed_now()).unwrap();
        assert_eq!(n.timestamp_iso(), "2020-01-01T00:00:00.000Z");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Socket messages
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn socket_register_wire_format() {
        let msg: SocketMessage = serde_json::from_str(r#"{"type":"register","appId":"jf-app-abc"}"#).unwrap();
        assert_eq!(msg, SocketMessage::Register { app_id: "jf-app-abc".into() });

        let ack = SocketMessage::Registered { app_id: "jf-app-abc".into() };
        let parsed: serde_json::Value = serde_json::from_str(&ack.to_json()).unwrap();
        assert_eq!(parsed, json!({"type": "registered", "appId": "jf-app-abc"}));
    }

    #[test]
    fn socket_ping_pong() {
        let msg: SocketMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg, SocketMessage::Ping);
        assert_eq!(SocketMessage::Pong.to_json(), r#"{"type":"pong"}"#);
    }

    #[test]
    fn socket_notification_carries_payload() {
        let n = Notification::build_at("T", "D", NotificationType::Info, NotificationOptions::new(), fixed_now());
        let msg = SocketMessage::Notification { payload: n.clone() };
        let parsed: serde_json::Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(parsed["type"], "notification");
        assert_eq!(parsed["payload"]["title"], "T");

        let back: SocketMessage = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(back, SocketMessage::Notification { payload: n });
    }

    #[test]
    fn socket_event_wire_format() {
        let msg: SocketMessage = serde_json::from_str(
            r#"{"type":"event","event":"new_notification","payload":{"title":"T","description":"D"}}"#,
        ).unwrap();
        let SocketMessage::Event { event, payload } = msg else {
            panic!("expected an event");
        };
        assert_eq!(event, NEW_NOTIFICATION_EVENT);
        assert_eq!(payload["title"], "T");

        let bare: SocketMessage = serde_json::from_str(r#"{"type":"event","event":"typing"}"#).unwrap();
        assert_eq!(bare, SocketMessage::Event { event: "typing".into(), payload: serde_json::Value::Null });
    }

    // ─────────────────────────────────────────────────────────────────────
    // Routes
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn route_paths() {
        assert_eq!(Routes::NOTIFICATIONS, "/api/notifications");
        assert_eq!(Routes::SOCKET, "/ws");
        assert_eq!(Headers::API_KEY, "X-API-Key");
    }
}
