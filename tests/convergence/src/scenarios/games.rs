//! Game scenarios.
//!
//! Moves are made on different devices. Whichever device first holds every
//! move of a round completes it, and the derived ids of the next round make
//! concurrent completions land on the same records.

#[cfg(test)]
mod tests {
    use crate::assertions::{assert_converged, assert_rounds};
    use crate::harness::Pair;
    use league_client::{ClientError, RoundCompletion, SyncEvent};
    use league_core::GameState;
    use league_types::{EntityKind, EntityRef, Game, MoveId, Shape};
    use tokio::sync::broadcast;

    async fn start_game(pair: &Pair) -> Game {
        let bob = pair.bob_seat().unwrap();
        let game = pair
            .ann
            .client
            .create_game(pair.league.id, &[pair.ann_seat(), bob])
            .await
            .unwrap();
        pair.mirror.sync(&pair.ann, &pair.bob).await.unwrap();
        pair.mirror.sync(&pair.bob, &pair.ann).await.unwrap();
        game
    }

    fn advanced(events: &mut broadcast::Receiver<SyncEvent>, game: &Game) -> Vec<GameState> {
        let mut states = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SyncEvent::RoundAdvanced { game_id, state } = event {
                if game_id == game.id {
                    states.push(state);
                }
            }
        }
        states
    }

    // ========================================================================
    // Remote completion
    // ========================================================================

    /// The device receiving the last move declares the winner; the other
    /// device learns it from the mirror.
    #[tokio::test]
    async fn remote_move_decides_the_game() {
        let pair = Pair::joined().await.unwrap();
        let game = start_game(&pair).await;
        let round = game.current_round().unwrap();
        let (ann, bob) = (pair.ann_seat(), pair.bob_seat().unwrap());
        let mut ann_events = pair.ann.client.subscribe_sync_events();

        pair.ann.client.set_move(round, ann, Shape::Rock).await.unwrap();
        pair.mirror.sync(&pair.ann, &pair.bob).await.unwrap();
        assert_eq!(
            pair.bob.client.game_state(game.id).await.unwrap(),
            GameState::Open { round_index: 0 }
        );

        pair.bob.client.set_move(round, bob, Shape::Scissors).await.unwrap();
        pair.mirror.sync(&pair.bob, &pair.ann).await.unwrap();

        let won = GameState::Won { winner: ann };
        assert_eq!(advanced(&mut ann_events, &game), vec![won]);
        assert_eq!(pair.ann.client.game_state(game.id).await.unwrap(), won);

        pair.mirror.sync(&pair.ann, &pair.bob).await.unwrap();
        assert_eq!(pair.bob.client.game_state(game.id).await.unwrap(), won);
        assert_rounds(&pair.bob, game.id, 1).await.unwrap();
        assert_converged(&pair.ann, &pair.bob).await.unwrap();
    }

    /// A draw opens round 1 with both players undecided again.
    #[tokio::test]
    async fn remote_draw_opens_the_next_round() {
        let pair = Pair::joined().await.unwrap();
        let game = start_game(&pair).await;
        let round = game.current_round().unwrap();
        let (ann, bob) = (pair.ann_seat(), pair.bob_seat().unwrap());

        pair.ann.client.set_move(round, ann, Shape::Paper).await.unwrap();
        pair.mirror.sync(&pair.ann, &pair.bob).await.unwrap();
        pair.bob.client.set_move(round, bob, Shape::Paper).await.unwrap();
        pair.mirror.sync(&pair.bob, &pair.ann).await.unwrap();
        pair.mirror.sync(&pair.ann, &pair.bob).await.unwrap();

        for device in [&pair.ann, &pair.bob] {
            assert_eq!(
                device.client.game_state(game.id).await.unwrap(),
                GameState::Open { round_index: 1 }
            );
            assert_rounds(device, game.id, 2).await.unwrap();
        }
        let next = pair.bob.client.rounds(game.id).await.unwrap()[1].id;
        let moves = pair.bob.client.moves(next).await.unwrap();
        assert_eq!(moves.len(), 2);
        assert!(moves.iter().all(|m| m.shape == Shape::Undecided));
        assert_converged(&pair.ann, &pair.bob).await.unwrap();
    }

    // ========================================================================
    // Concurrent completion
    // ========================================================================

    /// Both devices complete the same draw before seeing each other's
    /// completion; the mirrored results coincide.
    #[tokio::test]
    async fn concurrent_completion_converges() {
        let pair = Pair::joined().await.unwrap();
        let game = start_game(&pair).await;
        let round = game.current_round().unwrap();
        let (ann, bob) = (pair.ann_seat(), pair.bob_seat().unwrap());
        let mut ann_events = pair.ann.client.subscribe_sync_events();
        let mut bob_events = pair.bob.client.subscribe_sync_events();

        pair.ann.client.set_move(round, ann, Shape::Rock).await.unwrap();
        pair.bob.client.set_move(round, bob, Shape::Rock).await.unwrap();

        // Both moves are in flight at the same time.
        let to_bob = pair.mirror.collect(&pair.ann, &pair.bob).await.unwrap();
        let to_ann = pair.mirror.collect(&pair.bob, &pair.ann).await.unwrap();
        assert_eq!(to_bob.len(), 1);
        assert_eq!(to_ann.len(), 1);
        pair.mirror.deliver(to_bob, &pair.bob).await.unwrap();
        pair.mirror.deliver(to_ann, &pair.ann).await.unwrap();

        let open = GameState::Open { round_index: 1 };
        assert_eq!(advanced(&mut ann_events, &game), vec![open]);
        assert_eq!(advanced(&mut bob_events, &game), vec![open]);

        pair.mirror.sync(&pair.ann, &pair.bob).await.unwrap();
        pair.mirror.sync(&pair.bob, &pair.ann).await.unwrap();

        assert_rounds(&pair.ann, game.id, 2).await.unwrap();
        assert_rounds(&pair.bob, game.id, 2).await.unwrap();
        assert_converged(&pair.ann, &pair.bob).await.unwrap();
        assert!(advanced(&mut ann_events, &game).is_empty());
        assert!(advanced(&mut bob_events, &game).is_empty());
    }

    // ========================================================================
    // Partial delivery
    // ========================================================================

    /// Bob's own move record reaches his device after Ann's rock. Ann's move
    /// alone must not decide the game.
    #[tokio::test]
    async fn late_move_keeps_the_round_open() {
        let pair = Pair::joined().await.unwrap();
        let (ann, bob) = (pair.ann_seat(), pair.bob_seat().unwrap());
        let game = pair
            .ann
            .client
            .create_game(pair.league.id, &[ann, bob])
            .await
            .unwrap();
        let round = game.current_round().unwrap();
        pair.ann.client.set_move(round, ann, Shape::Rock).await.unwrap();

        let mut to_bob = pair.mirror.collect(&pair.ann, &pair.bob).await.unwrap();
        let bobs_move = EntityRef::from(MoveId::for_round(round, bob));
        let late = to_bob.hold_back(|entity| *entity == bobs_move);
        assert_eq!(late.len(), 1);
        pair.mirror.deliver(to_bob, &pair.bob).await.unwrap();

        assert_eq!(
            pair.bob.client.game_state(game.id).await.unwrap(),
            GameState::Open { round_index: 0 }
        );
        assert_eq!(
            pair.bob.client.complete_round_if_ready(round).await.unwrap(),
            RoundCompletion::AwaitingMoves { remaining: 1 }
        );
        assert_rounds(&pair.bob, game.id, 1).await.unwrap();

        pair.mirror.deliver(late, &pair.bob).await.unwrap();
        pair.bob.client.set_move(round, bob, Shape::Paper).await.unwrap();
        pair.mirror.sync(&pair.bob, &pair.ann).await.unwrap();
        pair.mirror.sync(&pair.ann, &pair.bob).await.unwrap();

        let won = GameState::Won { winner: bob };
        assert_eq!(pair.ann.client.game_state(game.id).await.unwrap(), won);
        assert_eq!(pair.bob.client.game_state(game.id).await.unwrap(), won);
        assert_converged(&pair.ann, &pair.bob).await.unwrap();
    }

    /// Moves and round of a new game arrive before the game itself.
    #[tokio::test]
    async fn game_record_arriving_last() {
        let pair = Pair::joined().await.unwrap();
        let (ann, bob) = (pair.ann_seat(), pair.bob_seat().unwrap());
        let game = pair
            .ann
            .client
            .create_game(pair.league.id, &[ann, bob])
            .await
            .unwrap();
        let round = game.current_round().unwrap();
        pair.ann.client.set_move(round, ann, Shape::Scissors).await.unwrap();

        let mut to_bob = pair.mirror.collect(&pair.ann, &pair.bob).await.unwrap();
        let late = to_bob.hold_back_kinds(&[EntityKind::Game, EntityKind::League]);
        assert_eq!(late.len(), 2);
        pair.mirror.deliver(to_bob, &pair.bob).await.unwrap();
        assert!(matches!(
            pair.bob.client.game_state(game.id).await,
            Err(ClientError::NotFound(_))
        ));
        assert_eq!(pair.bob.client.moves(round).await.unwrap().len(), 2);

        pair.mirror.deliver(late, &pair.bob).await.unwrap();
        assert_eq!(
            pair.bob.client.game_state(game.id).await.unwrap(),
            GameState::Open { round_index: 0 }
        );

        pair.bob.client.set_move(round, bob, Shape::Scissors).await.unwrap();
        pair.mirror.sync(&pair.bob, &pair.ann).await.unwrap();
        pair.mirror.sync(&pair.ann, &pair.bob).await.unwrap();

        for device in [&pair.ann, &pair.bob] {
            assert_eq!(
                device.client.game_state(game.id).await.unwrap(),
                GameState::Open { round_index: 1 }
            );
            assert_rounds(device, game.id, 2).await.unwrap();
        }
        assert_converged(&pair.ann, &pair.bob).await.unwrap();
    }
}
