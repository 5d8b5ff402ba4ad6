mod common;

use common::{device, edit_json, fixture, NOW};
use decentri_license::canonical::{entry_hash, genesis_hash};
use decentri_license::{
    bind, compare_state_chains, extend, replay, ErrorKind, LedgerCursor, LicenseError,
    UsageEvent, ACTIVATE_ACTION,
};
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;

fn params(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

// ── Binding ──

#[test]
fn bind_appends_activation_entry() {
    let f = fixture();
    let token = f.token();
    let dev = device("device-a", 10);
    let bound = bind(&token, &dev, NOW).unwrap();

    assert_eq!(bound.holder_device_id().unwrap(), "device-a");
    assert_eq!(bound.usage_chain().len(), 1);
    let entry = &bound.usage_chain()[0];
    assert_eq!(entry.seq, 0);
    assert_eq!(entry.action, ACTIVATE_ACTION);
    assert_eq!(entry.hash_prev, genesis_hash(token.token_id()));
    assert_eq!(entry.params["device_id"], json!("device-a"));
    assert_eq!(entry.params["device_public_key"], json!(dev.public_key_b64()));
    assert_eq!(bound.state_index(), 0);
    assert_eq!(bound.ledger_head(), entry_hash(entry).unwrap());
}

#[test]
fn bind_leaves_original_untouched() {
    let f = fixture();
    let token = f.token();
    let before = token.clone();
    let _ = bind(&token, &device("device-a", 10), NOW).unwrap();
    assert_eq!(token, before);
    assert!(!token.is_bound());
}

#[test]
fn rebinding_same_device_is_a_no_op() {
    let f = fixture();
    let dev = device("device-a", 10);
    let bound = bind(&f.token(), &dev, NOW).unwrap();
    let again = bind(&bound, &dev, NOW + 5).unwrap();
    assert_eq!(again, bound);
}

#[test]
fn rebinding_to_another_device_moves_holder() {
    let f = fixture();
    let a = device("device-a", 10);
    let b = device("device-b", 11);
    let bound = bind(&f.token(), &a, NOW).unwrap();
    let moved = bind(&bound, &b, NOW + 1).unwrap();

    assert_eq!(moved.holder_device_id().unwrap(), "device-b");
    assert_eq!(moved.usage_chain().len(), 2);
    let state = replay(&moved).unwrap();
    assert_eq!(state.binding.unwrap().device_id, "device-b");

    let err = extend(&moved, &a, "open", Map::new(), NOW + 2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotBound);
    assert!(extend(&moved, &b, "open", Map::new(), NOW + 2).is_ok());
}

// ── Appending ──

#[test]
fn extend_links_entries() {
    let f = fixture();
    let dev = device("device-a", 10);
    let bound = bind(&f.token(), &dev, NOW).unwrap();
    let one = extend(&bound, &dev, "open", params(json!({"file": "a.txt"})), NOW + 1).unwrap();
    let two = extend(&one, &dev, "save", Map::new(), NOW + 2).unwrap();

    let chain = two.usage_chain();
    assert_eq!(chain.len(), 3);
    assert_eq!(chain[1].hash_prev, entry_hash(&chain[0]).unwrap());
    assert_eq!(chain[2].hash_prev, entry_hash(&chain[1]).unwrap());
    assert_eq!(chain[1].params["file"], json!("a.txt"));
    assert_eq!(two.state_index(), 2);
    assert_eq!(two.last_seq(), Some(2));
}

#[test]
fn extend_unbound_is_not_bound() {
    let f = fixture();
    let err = extend(&f.token(), &device("device-a", 10), "open", Map::new(), NOW).unwrap_err();
    assert!(matches!(err, LicenseError::NotBound(_)));
}

#[test]
fn extend_from_other_device_is_not_bound() {
    let f = fixture();
    let bound = bind(&f.token(), &device("device-a", 10), NOW).unwrap();
    let err = extend(&bound, &device("device-b", 11), "open", Map::new(), NOW).unwrap_err();
    assert!(matches!(err, LicenseError::NotBound(_)));
}

#[test]
fn extend_with_same_id_but_other_key_is_not_bound() {
    let f = fixture();
    let bound = bind(&f.token(), &device("device-a", 10), NOW).unwrap();
    let impostor = device("device-a", 12);
    let err = extend(&bound, &impostor, "open", Map::new(), NOW).unwrap_err();
    assert!(matches!(err, LicenseError::NotBound(_)));
}

#[test]
fn extend_rejects_empty_and_activate_actions() {
    let f = fixture();
    let dev = device("device-a", 10);
    let bound = bind(&f.token(), &dev, NOW).unwrap();
    assert_eq!(
        extend(&bound, &dev, " ", Map::new(), NOW).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    assert_eq!(
        extend(&bound, &dev, ACTIVATE_ACTION, Map::new(), NOW)
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidArgument
    );
}

// ── Tamper detection ──

fn ledger_of_three() -> decentri_license::Token {
    let f = fixture();
    let dev = device("device-a", 10);
    let bound = bind(&f.token(), &dev, NOW).unwrap();
    let one = extend(&bound, &dev, "open", Map::new(), NOW + 1).unwrap();
    extend(&one, &dev, "save", Map::new(), NOW + 2).unwrap()
}

fn tampered_seq(err: LicenseError) -> u64 {
    match err {
        LicenseError::LedgerTampered { seq, .. } => seq,
        other => panic!("expected LedgerTampered, got {other:?}"),
    }
}

#[test]
fn replay_accepts_untouched_ledger() {
    let state = replay(&ledger_of_three()).unwrap();
    assert_eq!(state.next_seq, 3);
    assert_eq!(state.last_seq(), Some(2));
}

#[test]
fn truncated_ledger_is_tampered() {
    let token = ledger_of_three();
    let edited = edit_json(&token, |v| {
        v["usage_chain"].as_array_mut().unwrap().pop();
    });
    assert_eq!(tampered_seq(replay(&edited).unwrap_err()), 1);
}

#[test]
fn truncation_with_rewritten_head_is_tampered() {
    let token = ledger_of_three();
    let head_of_two = entry_hash(&token.usage_chain()[1]).unwrap();
    let edited = edit_json(&token, |v| {
        v["usage_chain"].as_array_mut().unwrap().pop();
        v["state_index"] = json!(1);
        v["ledger_head"] = json!(head_of_two);
    });
    let err = replay(&edited).unwrap_err();
    assert!(err.to_string().contains("state signature"), "{err}");
}

#[test]
fn reordered_entries_are_tampered() {
    let token = ledger_of_three();
    let edited = edit_json(&token, |v| {
        v["usage_chain"].as_array_mut().unwrap().swap(1, 2);
    });
    assert_eq!(tampered_seq(replay(&edited).unwrap_err()), 2);
}

#[test]
fn edited_params_are_tampered() {
    let token = ledger_of_three();
    let edited = edit_json(&token, |v| {
        v["usage_chain"][2]["params"] = json!({"extra": true});
    });
    assert_eq!(tampered_seq(replay(&edited).unwrap_err()), 2);
}

#[test]
fn broken_hash_link_is_tampered() {
    let token = ledger_of_three();
    let edited = edit_json(&token, |v| {
        v["usage_chain"][1]["hash_prev"] = json!("00");
    });
    let err = replay(&edited).unwrap_err();
    assert_eq!(tampered_seq(err), 1);
}

#[test]
fn forged_holder_is_tampered() {
    let token = ledger_of_three();
    let edited = edit_json(&token, |v| v["holder_device_id"] = json!("device-z"));
    assert_eq!(tampered_seq(replay(&edited).unwrap_err()), 2);
}

#[test]
fn holder_without_ledger_is_tampered() {
    let f = fixture();
    let edited = edit_json(&f.token(), |v| v["holder_device_id"] = json!("device-a"));
    assert_eq!(tampered_seq(replay(&edited).unwrap_err()), 0);
}

#[test]
fn usage_before_activation_is_tampered() {
    let token = ledger_of_three();
    let edited = edit_json(&token, |v| {
        v["usage_chain"][0]["action"] = json!("open");
    });
    assert_eq!(tampered_seq(replay(&edited).unwrap_err()), 0);
}

#[test]
fn foreign_activation_signature_is_tampered() {
    let token = ledger_of_three();
    let other = device("device-b", 11);
    let edited = edit_json(&token, |v| {
        v["usage_chain"][0]["params"]["device_public_key"] = json!(other.public_key_b64());
    });
    assert_eq!(tampered_seq(replay(&edited).unwrap_err()), 0);
}

// ── Usage events ──

#[test]
fn usage_event_with_action() {
    let event = UsageEvent::from_json(r#"{"action":"export","params":{"format":"pdf"}}"#).unwrap();
    assert_eq!(event.action, "export");
    assert_eq!(event.params["format"], json!("pdf"));
}

#[test]
fn usage_event_without_params() {
    let event = UsageEvent::from_json(r#"{"action":"print"}"#).unwrap();
    assert_eq!(event.action, "print");
    assert!(event.params.is_empty());
}

#[test]
fn usage_event_without_action_records_whole_object() {
    let event = UsageEvent::from_json(r#"{"feature":"ocr","pages":3}"#).unwrap();
    assert_eq!(event.action, "usage");
    assert_eq!(event.params["feature"], json!("ocr"));
    assert_eq!(event.params["pages"], json!(3));
}

#[test]
fn usage_event_rejects_non_objects() {
    for input in ["[1,2]", "\"open\"", "not json", r#"{"action":"x","params":[1]}"#] {
        let err = UsageEvent::from_json(input).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{input}");
    }
}

// ── Cursor ──

#[test]
fn stale_append_is_sequence_conflict() {
    let f = fixture();
    let dev = device("device-a", 10);
    let mut cursor = LedgerCursor::new();
    let bound = cursor.bind(&f.token(), &dev, NOW).unwrap();

    let next = cursor.append(&bound, &dev, "open", Map::new(), NOW + 1).unwrap();
    assert_eq!(cursor.observed(next.token_id()).unwrap().seq, 1);

    let err = cursor.append(&bound, &dev, "open", Map::new(), NOW + 2).unwrap_err();
    assert!(matches!(err, LicenseError::SequenceConflict { observed: 1, .. }));
}

#[test]
fn forked_copy_is_sequence_conflict() {
    let f = fixture();
    let dev = device("device-a", 10);
    let mut cursor = LedgerCursor::new();
    let bound = cursor.bind(&f.token(), &dev, NOW).unwrap();
    let _ = cursor.append(&bound, &dev, "open", Map::new(), NOW + 1).unwrap();

    let fork = extend(&bound, &dev, "save", Map::new(), NOW + 1).unwrap();
    let err = cursor.check(&fork).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SequenceConflict);
}

#[test]
fn cursor_accepts_newer_copies() {
    let f = fixture();
    let dev = device("device-a", 10);
    let mut cursor = LedgerCursor::new();
    let bound = cursor.bind(&f.token(), &dev, NOW).unwrap();
    let newer = extend(&bound, &dev, "open", Map::new(), NOW + 1).unwrap();
    cursor.check(&newer).unwrap();
    cursor.check(&bound).unwrap();
    cursor.observe(&newer).unwrap();
    assert!(cursor.check(&bound).is_err());
}

#[test]
fn unbound_copy_after_binding_conflicts() {
    let f = fixture();
    let token = f.token();
    let mut cursor = LedgerCursor::new();
    let _ = cursor.bind(&token, &device("device-a", 10), NOW).unwrap();
    assert_eq!(
        cursor.check(&token).unwrap_err().kind(),
        ErrorKind::SequenceConflict
    );
    cursor.forget(token.token_id());
    cursor.check(&token).unwrap();
}

// ── State chain comparison ──

#[test]
fn longer_ledger_is_newer() {
    let f = fixture();
    let dev = device("device-a", 10);
    let token = f.token();
    let bound = bind(&token, &dev, NOW).unwrap();
    assert_eq!(compare_state_chains(&bound, &token), Ordering::Greater);
    assert_eq!(compare_state_chains(&token, &bound), Ordering::Less);
    assert_eq!(compare_state_chains(&bound, &bound), Ordering::Equal);
}

#[test]
fn equal_ledgers_fall_back_to_issue_time() {
    let f = fixture();
    let older = f.issuer.issue(decentri_license::TokenRequest::new(NOW)).unwrap();
    let newer = f.issuer.issue(decentri_license::TokenRequest::new(NOW + 1)).unwrap();
    assert_eq!(compare_state_chains(&newer, &older), Ordering::Greater);
}

// ── Properties ──

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn appended_ledgers_are_well_formed(actions in proptest::collection::vec("[a-z]{1,8}", 0..8)) {
        let f = fixture();
        let dev = device("device-a", 10);
        let mut token = bind(&f.token(), &dev, NOW).unwrap();
        for (i, action) in actions.iter().enumerate() {
            prop_assume!(action != ACTIVATE_ACTION);
            token = extend(&token, &dev, action, Map::new(), NOW + i as i64).unwrap();
        }

        let chain = token.usage_chain();
        prop_assert_eq!(chain.len(), actions.len() + 1);
        for (i, entry) in chain.iter().enumerate() {
            prop_assert_eq!(entry.seq, i as u64);
            if i > 0 {
                prop_assert_eq!(&entry.hash_prev, &entry_hash(&chain[i - 1]).unwrap());
            }
        }
        prop_assert!(replay(&token).is_ok());
    }

    #[test]
    fn dropping_any_entry_is_detected(len in 2usize..6, drop in 0usize..6) {
        let drop = drop % len;
        let f = fixture();
        let dev = device("device-a", 10);
        let mut token = bind(&f.token(), &dev, NOW).unwrap();
        for i in 1..len {
            token = extend(&token, &dev, "tick", Map::new(), NOW + i as i64).unwrap();
        }
        let edited = edit_json(&token, |v| {
            v["usage_chain"].as_array_mut().unwrap().remove(drop);
        });
        prop_assert_eq!(replay(&edited).unwrap_err().kind(), ErrorKind::LedgerTampered);
    }
}
