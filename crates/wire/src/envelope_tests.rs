// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use aicli_core::PageRequest;

#[test]
fn success_envelope_shape() {
    let body = serde_json::to_value(ApiSuccess::new(serde_json::json!({"id": "wks-1"}))).unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["id"], "wks-1");
    assert!(body.get("meta").is_none());
}

#[test]
fn paged_envelope_carries_meta() {
    let meta = PageMeta::new(PageRequest::new(1, 20), 45);
    let body = serde_json::to_value(ApiSuccess::paged(vec![1, 2, 3], meta)).unwrap();
    assert_eq!(body["meta"]["total"], 45);
    assert_eq!(body["meta"]["has_more"], true);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);
}

#[test]
fn failure_envelope_shape() {
    let body =
        serde_json::to_value(ApiFailure::new(ErrorKind::NotFound, "session not found")).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "ERR_NOT_FOUND");
    assert_eq!(body["error"]["message"], "session not found");
    assert!(body["error"].get("details").is_none());
}

#[test]
fn failure_details_are_optional() {
    let failure = ApiFailure::new(ErrorKind::Validation, "bad name")
        .with_details(serde_json::json!({"field": "name"}));
    let body = serde_json::to_value(failure).unwrap();
    assert_eq!(body["error"]["details"]["field"], "name");
}
