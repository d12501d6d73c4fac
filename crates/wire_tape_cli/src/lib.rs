//! `wire-tape`: inspect, move and replay recorded transport sessions.
//!
//! Recordings live in a directory store (`WIRE_TAPE_STORE_DIR`, default
//! `.wire_tape/recordings`), one JSON file per key. `replay` plays a recording
//! in real time through a fake transport and prints every delivered message.

pub mod commands;
