//! Behaviour every StateStore implementation must show. Each check takes an
//! unconfigured store and a request id unique to the test.

#![allow(dead_code)]

use flowstate::{StateError, StateStore};
use futures_util::future::join_all;

pub async fn check_order_scenario<S: StateStore>(mut store: S, request_id: &str) {
    store.configure("orderflow", request_id);
    store.init().await.unwrap();

    store.set("status", "pending").await.unwrap();
    store.update("status", "pending", "running").await.unwrap();

    let err = store.update("status", "pending", "done").await.unwrap_err();
    assert!(err.is_conflict(), "expected conflict, got {:?}", err);
    assert_eq!(store.get("status").await.unwrap(), "running");

    store.cleanup().await.unwrap();
    let err = store.get("status").await.unwrap_err();
    assert!(err.is_not_found(), "expected not found, got {:?}", err);
}

pub async fn check_namespace_isolation<S: StateStore + Clone>(base: S, request_id: &str) {
    let mut first = base.clone();
    first.configure("flow", &format!("{}-a", request_id));
    let mut second = base.clone();
    second.configure("flow", &format!("{}-b", request_id));
    let mut other_flow = base;
    other_flow.configure("other", &format!("{}-a", request_id));

    first.set("shared", "from-first").await.unwrap();
    assert!(second.get("shared").await.unwrap_err().is_not_found());
    assert!(other_flow.get("shared").await.unwrap_err().is_not_found());

    second.set("shared", "from-second").await.unwrap();
    first.cleanup().await.unwrap();

    assert!(first.get("shared").await.unwrap_err().is_not_found());
    assert_eq!(second.get("shared").await.unwrap(), "from-second");
    second.cleanup().await.unwrap();
}

pub async fn check_single_cas_winner<S: StateStore + Clone>(mut store: S, request_id: &str) {
    store.configure("race", request_id);
    store.set("slot", "open").await.unwrap();

    let attempts = (0..16).map(|i| {
        let store = store.clone();
        async move {
            let claim = format!("worker-{}", i);
            let result = store.update("slot", "open", &claim).await;
            (claim, result)
        }
    });
    let results = join_all(attempts).await;

    let winners: Vec<&String> = results
        .iter()
        .filter(|(_, r)| r.is_ok())
        .map(|(claim, _)| claim)
        .collect();
    assert_eq!(winners.len(), 1);
    for (_, result) in &results {
        if let Err(err) = result {
            assert!(err.is_conflict(), "expected conflict, got {:?}", err);
        }
    }
    assert_eq!(&store.get("slot").await.unwrap(), winners[0]);

    store.cleanup().await.unwrap();
}

pub async fn check_incr<S: StateStore>(mut store: S, request_id: &str) {
    store.configure("counter", request_id);

    assert_eq!(store.incr("hits", 5).await.unwrap(), 5);
    assert_eq!(store.incr("hits", -2).await.unwrap(), 3);
    let stored: i64 = store.get("hits").await.unwrap().parse().unwrap();
    assert_eq!(stored, 3);

    store.set("label", "not-a-number").await.unwrap();
    let err = store.incr("label", 1).await.unwrap_err();
    assert!(matches!(err, StateError::Store { .. }), "got {:?}", err);
    assert_eq!(store.get("label").await.unwrap(), "not-a-number");

    store.cleanup().await.unwrap();
}

pub async fn check_set_overwrites<S: StateStore>(mut store: S, request_id: &str) {
    store.configure("flow", request_id);

    store.set("k", "first").await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), "first");
    store.set("k", "second").await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), "second");
    store.set("k", "").await.unwrap();
    assert_eq!(store.get("k").await.unwrap(), "");

    store.cleanup().await.unwrap();
}

pub async fn check_update_absent_key_conflicts<S: StateStore>(mut store: S, request_id: &str) {
    store.configure("flow", request_id);

    let err = store.update("missing", "anything", "new").await.unwrap_err();
    assert!(err.is_conflict(), "got {:?}", err);
    assert!(store.get("missing").await.unwrap_err().is_not_found());
}

pub async fn check_cleanup_removes_all<S: StateStore + Clone>(base: S, request_id: &str) {
    let mut store = base.clone();
    store.configure("flow", request_id);
    // A sibling whose id would match an unescaped glob of the first.
    let mut wildcard = base;
    wildcard.configure("flow", &format!("{}*", request_id));

    for key in ["a", "b", "c"] {
        store.set(key, key).await.unwrap();
        wildcard.set(key, key).await.unwrap();
    }
    store.incr("n", 1).await.unwrap();

    wildcard.cleanup().await.unwrap();
    assert_eq!(store.get("a").await.unwrap(), "a");

    store.cleanup().await.unwrap();
    for key in ["a", "b", "c", "n"] {
        let err = store.get(key).await.unwrap_err();
        assert!(err.is_not_found(), "{} survived cleanup: {:?}", key, err);
    }

    // Cleaning an empty namespace is fine.
    store.cleanup().await.unwrap();
}

pub async fn check_invalid_keys<S: StateStore>(mut store: S, request_id: &str) {
    store.configure("flow", request_id);

    for key in ["", "nested.key"] {
        let err = store.set(key, "v").await.unwrap_err();
        assert!(matches!(err, StateError::InvalidKey { .. }), "got {:?}", err);
    }
    assert!(matches!(
        store.update("a.b", "x", "y").await.unwrap_err(),
        StateError::InvalidKey { .. }
    ));
}

pub async fn check_requires_configure<S: StateStore>(store: S) {
    assert!(store.namespace().is_none());
    assert!(matches!(
        store.get("k").await.unwrap_err(),
        StateError::NotConfigured
    ));
    assert!(matches!(
        store.set("k", "v").await.unwrap_err(),
        StateError::NotConfigured
    ));
    assert!(matches!(
        store.update("k", "a", "b").await.unwrap_err(),
        StateError::NotConfigured
    ));
    assert!(matches!(
        store.incr("k", 1).await.unwrap_err(),
        StateError::NotConfigured
    ));
    assert!(matches!(
        store.cleanup().await.unwrap_err(),
        StateError::NotConfigured
    ));
}

pub async fn check_rejects_ambiguous_namespaces<S: StateStore + Clone>(base: S, request_id: &str) {
    // ("a.b", "c") and ("a", "b.c") would both map to "<prefix>.a.b.c".
    let mut dotted_flow = base.clone();
    dotted_flow.configure(&format!("{}.b", request_id), "c");
    let mut dotted_request = base.clone();
    dotted_request.configure(request_id, "b.c");

    for store in [&dotted_flow, &dotted_request] {
        assert!(store.namespace().is_none());
        assert!(matches!(
            store.set("k", "v").await.unwrap_err(),
            StateError::InvalidNamespace { .. }
        ));
        assert!(matches!(
            store.get("k").await.unwrap_err(),
            StateError::InvalidNamespace { .. }
        ));
        assert!(matches!(
            store.cleanup().await.unwrap_err(),
            StateError::InvalidNamespace { .. }
        ));
    }

    for (flow, request) in [("", request_id), ("flow", "")] {
        let mut empty = base.clone();
        empty.configure(flow, request);
        assert!(matches!(
            empty.incr("n", 1).await.unwrap_err(),
            StateError::InvalidNamespace { .. }
        ));
    }

    // A child id like "<parent>.1" would otherwise sit inside the parent's
    // cleanup pattern.
    let mut parent = base.clone();
    parent.configure("flow", request_id);
    let mut child = base.clone();
    child.configure("flow", &format!("{}.1", request_id));
    let mut sibling = base;
    sibling.configure("flow", &format!("{}-1", request_id));

    assert!(matches!(
        child.set("status", "child").await.unwrap_err(),
        StateError::InvalidNamespace { .. }
    ));
    parent.set("status", "parent").await.unwrap();
    sibling.set("status", "sibling").await.unwrap();

    parent.cleanup().await.unwrap();
    assert!(parent.get("status").await.unwrap_err().is_not_found());
    assert_eq!(sibling.get("status").await.unwrap(), "sibling");
    sibling.cleanup().await.unwrap();

    // A rejected configure does not leave the previous namespace active.
    let mut reused = parent;
    reused.configure("flow", "bad.id");
    assert!(matches!(
        reused.set("status", "x").await.unwrap_err(),
        StateError::InvalidNamespace { .. }
    ));
}
