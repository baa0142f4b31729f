use gjkr_secp256k1::Secp256K1Sha256;
use rand::thread_rng;

#[tokio::test(start_paused = true)]
async fn check_membership_without_faults() {
    let rng = thread_rng();

    gjkr_core::tests::membership::check_membership_without_faults::<Secp256K1Sha256, _>(rng).await;
}

#[tokio::test(start_paused = true)]
async fn check_dropped_messages_exclude_senders() {
    let rng = thread_rng();

    gjkr_core::tests::membership::check_dropped_messages_exclude_senders::<Secp256K1Sha256, _>(
        rng,
    )
    .await;
}

#[tokio::test(start_paused = true)]
async fn check_undecryptable_shares_disqualify_sender() {
    let rng = thread_rng();

    gjkr_core::tests::membership::check_undecryptable_shares_disqualify_sender::<
        Secp256K1Sha256,
        _,
    >(rng)
    .await;
}

#[tokio::test(start_paused = true)]
async fn check_submission_order() {
    let rng = thread_rng();

    gjkr_core::tests::membership::check_submission_order::<Secp256K1Sha256, _>(rng).await;
}

#[tokio::test(start_paused = true)]
async fn check_publication_timeout() {
    let rng = thread_rng();

    gjkr_core::tests::membership::check_publication_timeout::<Secp256K1Sha256, _>(rng).await;
}

#[tokio::test(start_paused = true)]
async fn check_registered_group_is_not_resubmitted() {
    let rng = thread_rng();

    gjkr_core::tests::membership::check_registered_group_is_not_resubmitted::<Secp256K1Sha256, _>(
        rng,
    )
    .await;
}

#[tokio::test(start_paused = true)]
async fn check_submission_eligibility() {
    let rng = thread_rng();

    gjkr_core::tests::membership::check_submission_eligibility::<Secp256K1Sha256, _>(rng).await;
}

#[tokio::test(start_paused = true)]
async fn check_other_group_submission_is_ignored() {
    let rng = thread_rng();

    gjkr_core::tests::membership::check_other_group_submission_is_ignored::<Secp256K1Sha256, _>(
        rng,
    )
    .await;
}
