//! JSON message layer tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use serde_json::json;

use castlink_core::protocol::message::{encode_request, media_session_id_value, PlayerState};
use castlink_core::protocol::{namespace, Heartbeat, Inbound, Message};

const RECEIVER_STATUS: &str = r#"{
  "requestId": 3,
  "type": "RECEIVER_STATUS",
  "status": {
    "applications": [
      {
        "appId": "E8C28D3C",
        "displayName": "Backdrop",
        "isIdleScreen": true,
        "namespaces": [{ "name": "urn:x-cast:com.google.cast.sse" }],
        "sessionId": "idle-1",
        "statusText": "",
        "transportId": "idle-1"
      },
      {
        "appId": "CC1AD845",
        "displayName": "Default Media Receiver",
        "namespaces": [
          { "name": "urn:x-cast:com.google.cast.debugoverlay" },
          { "name": "urn:x-cast:com.google.cast.media" }
        ],
        "sessionId": "sess-1",
        "statusText": "Casting: Big Buck Bunny",
        "transportId": "app-1"
      }
    ],
    "volume": { "controlType": "attenuation", "level": 0.25, "muted": false, "stepInterval": 0.04 }
  }
}"#;

#[test]
fn receiver_status_is_typed() {
    let msg = Message::parse(RECEIVER_STATUS).unwrap();
    assert_eq!(msg.msg_type(), "RECEIVER_STATUS");
    assert_eq!(msg.request_id(), Some(3));

    let rs = msg.as_receiver_status().unwrap();
    assert_eq!(rs.status.applications.len(), 2);
    let app = rs.status.application_with(namespace::MEDIA).unwrap();
    assert_eq!(app.transport_id, "app-1");
    assert_eq!(app.session_id, "sess-1");
    assert_eq!(app.display_name, "Default Media Receiver");

    let vol = rs.status.volume.as_ref().unwrap();
    assert_eq!(vol.level, Some(0.25));
    assert_eq!(vol.muted, Some(false));
    assert_eq!(vol.step_interval, Some(0.04));
}

#[test]
fn media_status_accepts_numeric_and_string_session_ids() {
    let numeric = Message::parse(
        r#"{"type":"MEDIA_STATUS","requestId":0,"status":[{"mediaSessionId":42,"playerState":"PLAYING","currentTime":10.0}]}"#,
    )
    .unwrap();
    let text = Message::parse(
        r#"{"type":"MEDIA_STATUS","status":[{"mediaSessionId":"42","playerState":"BUFFERED"}]}"#,
    )
    .unwrap();

    let a = &numeric.as_media_status().unwrap().status[0];
    let b = &text.as_media_status().unwrap().status[0];
    assert_eq!(a.media_session_id, "42");
    assert_eq!(b.media_session_id, "42");
    assert_eq!(a.player_state, PlayerState::Playing);
    assert_eq!(b.player_state, PlayerState::Buffered);
    assert_eq!(a.current_time, Some(10.0));
    assert_eq!(b.current_time, None);

    // requestId 0 means unsolicited.
    assert_eq!(numeric.request_id(), None);
}

#[test]
fn unknown_kinds_round_trip_untouched() {
    let raw = r#"{"type":"DEVICE_UPDATED","requestId":9,"device":{"deviceId":"abc","name":"Kitchen"}}"#;
    let msg = Message::parse(raw).unwrap();

    match &msg {
        Message::Unknown(m) => {
            assert_eq!(m.msg_type, "DEVICE_UPDATED");
            assert_eq!(m.body["device"]["name"], "Kitchen");
        }
        other => panic!("expected unknown, got {other:?}"),
    }
    assert_eq!(msg.request_id(), Some(9));
    assert!(!msg.is_error_reply());
}

#[test]
fn error_replies_are_recognized() {
    let msg = Message::parse(r#"{"type":"INVALID_REQUEST","requestId":4,"reason":"INVALID_COMMAND"}"#).unwrap();
    assert!(msg.is_error_reply());
    assert_eq!(msg.reason(), Some("INVALID_COMMAND"));
}

#[test]
fn mismatches_are_protocol_errors() {
    for bad in [
        "not json",
        r#"{"requestId":1}"#,
        r#"{"type":"MEDIA_STATUS","status":[{"playerState":"PLAYING"}]}"#,
        r#"{"type":"MEDIA_STATUS","status":[{"mediaSessionId":1,"playerState":"DANCING"}]}"#,
        r#"{"type":"RECEIVER_STATUS"}"#,
    ] {
        let err = Message::parse(bad).unwrap_err();
        assert_eq!(err.code().as_str(), "PROTOCOL_MISMATCH", "payload={bad}");
    }
}

#[test]
fn heartbeats_are_never_parsed_as_messages() {
    assert_eq!(
        Inbound::classify(namespace::HEARTBEAT, "PING").unwrap(),
        Inbound::Heartbeat(Heartbeat::Ping)
    );
    assert_eq!(
        Inbound::classify(namespace::HEARTBEAT, r#"{"type":"PONG"}"#).unwrap(),
        Inbound::Heartbeat(Heartbeat::Pong)
    );
    assert!(Inbound::classify(namespace::HEARTBEAT, "HELLO").is_err());

    match Inbound::classify(namespace::RECEIVER, RECEIVER_STATUS).unwrap() {
        Inbound::Message(m) => assert_eq!(m.msg_type(), "RECEIVER_STATUS"),
        other => panic!("expected message, got {other:?}"),
    }
}

#[test]
fn requests_merge_type_and_request_id_into_data() {
    let s = encode_request("SEEK", Some(12), json!({ "mediaSessionId": 42, "currentTime": 30.0 })).unwrap();
    let v: serde_json::Value = serde_json::from_str(&s).unwrap();
    assert_eq!(v["type"], "SEEK");
    assert_eq!(v["requestId"], 12);
    assert_eq!(v["mediaSessionId"], 42);
    assert_eq!(v["currentTime"], 30.0);

    let bare = encode_request("CONNECT", None, serde_json::Value::Null).unwrap();
    assert_eq!(bare, r#"{"type":"CONNECT"}"#);

    assert!(encode_request("PLAY", Some(1), json!([1, 2])).is_err());
}

#[test]
fn session_ids_go_back_as_numbers_when_numeric() {
    assert_eq!(media_session_id_value("42"), json!(42));
    assert_eq!(media_session_id_value("abc"), json!("abc"));
}
