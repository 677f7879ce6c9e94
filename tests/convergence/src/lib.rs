//! # convergence-tests
//!
//! Multi-device convergence tests for the JanKenPon league tracker.
//!
//! Every simulated device runs a full [`league_client::LeagueClient`] on
//! in-memory stores. A [`harness::CloudMirror`] stands in for the cloud: it
//! copies the shared store's changes from one device to another and then
//! notifies the receiving device, exactly as a remote-change notification
//! would.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assertions;
pub mod harness;

pub mod scenarios;
