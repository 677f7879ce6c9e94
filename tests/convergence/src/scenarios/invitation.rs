//! Invitation scenarios.
//!
//! A league created on one device is shared, accepted on another and then
//! mirrored both ways until both devices agree on its membership.

#[cfg(test)]
mod tests {
    use crate::assertions::{assert_converged, assert_members, shared_view};
    use crate::harness::{Device, Pair};
    use league_types::{AccountId, ParticipantId, Query, Scope};

    // ========================================================================
    // Joining
    // ========================================================================

    /// The invitee ends up seated once, with the same id on both devices.
    #[tokio::test]
    async fn invitee_is_seated_on_both_devices() {
        let pair = Pair::joined().await.unwrap();

        assert_members(&pair.ann, pair.league.id, 2).await.unwrap();
        assert_members(&pair.bob, pair.league.id, 2).await.unwrap();
        assert_converged(&pair.ann, &pair.bob).await.unwrap();

        let expected =
            ParticipantId::for_membership(AccountId::for_record("_bob"), pair.league.id);
        assert_eq!(pair.bob_seat(), Some(expected));
    }

    /// Each device keeps one account per person, with identifiers filled in
    /// from the share.
    #[tokio::test]
    async fn accounts_are_bound_to_share_participants() {
        let pair = Pair::joined().await.unwrap();

        let private = pair.ann.store(Scope::OwnerPrivate);
        let matching = private
            .count(&Query::AccountsMatching(pair.bob.identity.clone()))
            .await
            .unwrap();
        assert_eq!(matching, 1);

        let private = pair.bob.store(Scope::OwnerPrivate);
        let matching = private
            .count(&Query::AccountsMatching(pair.ann.identity.clone()))
            .await
            .unwrap();
        assert_eq!(matching, 0, "Ann's account is linked by id only on Bob's device");
        let linked = private
            .count(&Query::AccountsClaiming(pair.ann_seat()))
            .await
            .unwrap();
        assert_eq!(linked, 1);
    }

    /// Mirroring again after convergence writes nothing.
    #[tokio::test]
    async fn converged_devices_stay_quiet() {
        let pair = Pair::joined().await.unwrap();
        let before = shared_view(&pair.bob).await.unwrap();

        pair.mirror.sync(&pair.bob, &pair.ann).await.unwrap();
        pair.mirror.sync(&pair.ann, &pair.bob).await.unwrap();
        let after_ann = pair.mirror.collect(&pair.ann, &pair.bob).await.unwrap();
        let after_bob = pair.mirror.collect(&pair.bob, &pair.ann).await.unwrap();

        assert!(after_ann.is_empty());
        assert!(after_bob.is_empty());
        assert_eq!(shared_view(&pair.bob).await.unwrap(), before);
    }

    // ========================================================================
    // Own writes
    // ========================================================================

    /// A device never treats its own writes as remote changes.
    #[tokio::test]
    async fn own_writes_are_not_relevant() {
        let ann = Device::start("Ann", "_ann").await.unwrap();
        let mut changed = ann.client.subscribe_store_changed();
        let mut relevant = ann.client.subscribe_transactions();

        ann.client.create_league("Lunch").await.unwrap();
        let shared = ann.store(Scope::LeagueShared).id();
        ann.client.on_remote_change(shared).unwrap();
        ann.client.flush().await.unwrap();

        assert_eq!(changed.try_recv().unwrap().store_id, shared);
        assert!(relevant.try_recv().is_err());
    }
}
