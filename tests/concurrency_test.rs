use std::sync::Arc;

use passkey_ceremony::testing::{constants::TEST_ORIGIN, SoftAuthenticator, TestFixtures};
use passkey_ceremony::webauthn::CoseAlgorithm;
use passkey_ceremony::CeremonyError;

/// Two submissions of the same assertion racing each other: exactly one verifies
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_double_submit_verifies_once() {
    let service = Arc::new(TestFixtures::service());
    let alice = TestFixtures::user("alice");
    let (mut authenticator, registered) =
        TestFixtures::register(&service, &alice, CoseAlgorithm::Es256).await;

    let (options, pending) = service.start_authentication(Some(&alice.handle)).await.unwrap();
    let assertion = authenticator.assert(&options, TEST_ORIGIN);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            let mut pending = pending.clone();
            let assertion = assertion.clone();
            tokio::spawn(
                async move { service.finish_authentication(&mut pending, &assertion).await },
            )
        })
        .collect();

    let mut verified = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(result) => {
                verified += 1;
                assert_eq!(result.counter, 1);
            }
            Err(err) => assert_eq!(err, CeremonyError::ChallengeAlreadyConsumed),
        }
    }
    assert_eq!(verified, 1);

    let stored = service
        .credentials()
        .find_by_id(&registered.credential.credential_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.counter, 1);
}

/// Two live challenges answered with the same counter: the registry update
/// is serialized, so one verifies and the other is a regression
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_counter_on_two_challenges() {
    let service = Arc::new(TestFixtures::service());
    let alice = TestFixtures::user("alice");
    let (mut authenticator, registered) =
        TestFixtures::register(&service, &alice, CoseAlgorithm::Es256).await;

    let (first_options, first_pending) =
        service.start_authentication(Some(&alice.handle)).await.unwrap();
    let (second_options, second_pending) =
        service.start_authentication(Some(&alice.handle)).await.unwrap();
    let first = authenticator.assert(&first_options, TEST_ORIGIN);
    authenticator.set_counter(0);
    let second = authenticator.assert(&second_options, TEST_ORIGIN);

    let handles: Vec<_> = [(first_pending, first), (second_pending, second)]
        .into_iter()
        .map(|(mut pending, assertion)| {
            let service = Arc::clone(&service);
            tokio::spawn(
                async move { service.finish_authentication(&mut pending, &assertion).await },
            )
        })
        .collect();

    let mut verified = 0;
    let mut regressions = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(result) => {
                verified += 1;
                assert_eq!(result.counter, 1);
            }
            Err(err) => {
                regressions += 1;
                assert_eq!(err, CeremonyError::CounterRegression { stored: 1, reported: 1 });
            }
        }
    }
    assert_eq!((verified, regressions), (1, 1));

    let stored = service
        .credentials()
        .find_by_id(&registered.credential.credential_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.counter, 1);
}

/// Independent ceremonies for different users do not interfere
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_users_all_verify() {
    let service = Arc::new(TestFixtures::service());

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let user = TestFixtures::user(&format!("user{i}"));
                let (mut authenticator, _) =
                    TestFixtures::register(&service, &user, CoseAlgorithm::EdDsa).await;

                let (options, mut pending) =
                    service.start_authentication(Some(&user.handle)).await?;
                let assertion = authenticator.assert(&options, TEST_ORIGIN);
                service.finish_authentication(&mut pending, &assertion).await
            })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.counter, 1);
    }
}

/// Two users enrolling the same credential id at once: one wins, one is a duplicate
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_enrolment() {
    let service = Arc::new(TestFixtures::service());
    let original = SoftAuthenticator::new(CoseAlgorithm::Es256);
    let credential_id = original.credential_id();

    let handles: Vec<_> = ["alice", "bob"]
        .into_iter()
        .map(|name| {
            let service = Arc::clone(&service);
            let credential_id = credential_id.clone();
            tokio::spawn(async move {
                let user = TestFixtures::user(name);
                let (options, mut pending) = service.start_registration(&user).await?;
                let response = SoftAuthenticator::new(CoseAlgorithm::Es256)
                    .with_credential_id(&credential_id)
                    .register(&options, TEST_ORIGIN);
                service
                    .finish_registration(&mut pending, &response)
                    .await
                    .map(|_| ())
            })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes.contains(&Err(CeremonyError::DuplicateCredential)));
}
