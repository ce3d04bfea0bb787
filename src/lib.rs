//! gesturecam library: on-device gesture detection with radio hand-off.
//!
//! A camera node waits for a trigger from its paired peer, captures a fixed
//! run of frames, classifies each one with an on-device model and sends the
//! run's outcome codes back to the peer in one notification.
//!
//! Everything here is `no_std` and platform-free, testable on any host with
//! `cargo test`. The firmware crate supplies the camera, the inference engine
//! and the radio through the traits in [`frame`], [`inference`] and [`radio`],
//! then drives a [`controller::DetectionController`] built by
//! [`startup::bring_up`].

#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod comm;
pub mod config;
pub mod controller;
pub mod defaults;
pub mod frame;
pub mod inference;
pub mod model;
pub mod peer;
pub mod protocol;
pub mod radio;
pub mod responder;
pub mod startup;

#[cfg(test)]
mod testing;
