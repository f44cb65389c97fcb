use memegate::{AdmissionGuard, Ledger, Rejection, SqliteLedger, TokenIssuer};
use std::sync::Arc;
use std::thread;

fn admit_concurrently(guard: &AdmissionGuard, token: &str, n: usize) -> (usize, usize) {
    let handles: Vec<_> = (0..n)
        .map(|_| {
            let guard = guard.clone();
            let token = token.to_string();
            thread::spawn(move || guard.admit(Some(&token)))
        })
        .collect();

    let mut admitted = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(_) => admitted += 1,
            Err(Rejection::InsufficientCredit) => refused += 1,
            Err(other) => panic!("unexpected rejection: {other:?}"),
        }
    }
    (admitted, refused)
}

#[test]
fn test_concurrent_calls_never_overdraw() {
    let ledger = Arc::new(SqliteLedger::open_in_memory().unwrap());
    let issued = TokenIssuer::new(ledger.clone(), 10).issue().unwrap();
    let guard = AdmissionGuard::new(ledger.clone());

    let (admitted, refused) = admit_concurrently(&guard, &issued.token, 64);

    assert_eq!(admitted, 10);
    assert_eq!(refused, 54);
    assert_eq!(ledger.lookup_by_token(&issued.token).unwrap().1, 0);
    assert_eq!(ledger.usage_summary(issued.client_id).unwrap().calls, 10);
}

#[test]
fn test_concurrent_calls_under_balance_all_admitted() {
    let ledger = Arc::new(SqliteLedger::open_in_memory().unwrap());
    let issued = TokenIssuer::new(ledger.clone(), 100).issue().unwrap();
    let guard = AdmissionGuard::new(ledger.clone());

    let (admitted, refused) = admit_concurrently(&guard, &issued.token, 40);

    assert_eq!(admitted, 40);
    assert_eq!(refused, 0);
    assert_eq!(ledger.lookup_by_token(&issued.token).unwrap().1, 60);
    assert_eq!(ledger.usage_summary(issued.client_id).unwrap().calls, 40);
}

#[test]
fn test_separate_connections_share_one_ledger_file() {
    // Two handles on the same file stand in for two gateway processes.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let path = path.to_str().unwrap();

    let first = Arc::new(SqliteLedger::open(path).unwrap());
    let second = Arc::new(SqliteLedger::open(path).unwrap());
    let issued = TokenIssuer::new(first.clone(), 25).issue().unwrap();

    let guards = [
        AdmissionGuard::new(first.clone()),
        AdmissionGuard::new(second.clone()),
    ];
    let handles: Vec<_> = (0..60)
        .map(|i| {
            let guard = guards[i % 2].clone();
            let token = issued.token.clone();
            thread::spawn(move || guard.admit(Some(&token)).is_ok())
        })
        .collect();
    let admitted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(admitted, 25);
    assert_eq!(first.lookup_by_token(&issued.token).unwrap().1, 0);
    assert_eq!(second.usage_summary(issued.client_id).unwrap().calls, 25);
}

#[test]
fn test_sequential_exhaustion_then_top_up() {
    let ledger = Arc::new(SqliteLedger::open_in_memory().unwrap());
    let issued = TokenIssuer::new(ledger.clone(), 100).issue().unwrap();
    let guard = AdmissionGuard::new(ledger.clone());

    for expected in (0..100).rev() {
        assert_eq!(guard.admit(Some(&issued.token)).unwrap().remaining, expected);
    }
    assert!(matches!(
        guard.admit(Some(&issued.token)),
        Err(Rejection::InsufficientCredit)
    ));
    assert_eq!(ledger.usage_summary(issued.client_id).unwrap().calls, 100);

    assert_eq!(ledger.top_up(&issued.token, 5).unwrap(), 5);
    assert_eq!(guard.admit(Some(&issued.token)).unwrap().remaining, 4);
    assert_eq!(ledger.usage_summary(issued.client_id).unwrap().calls, 101);
}
