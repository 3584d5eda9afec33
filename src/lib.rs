//! # SABER Flight Library
//!
//! Onboard flight computer for a high-altitude balloon payload.
//!
//! This library provides the flight-control core: GPS ingest, launch
//! calibration, flight-phase detection, the elapsed-time and geofence
//! termination triggers with their actuation sequence, and periodic APRS
//! position reports over a LoRa modem.

pub mod config;
pub mod display;
pub mod error;
pub mod flight;
pub mod gps;
pub mod mission;
pub mod recorder;
pub mod sensors;
pub mod serial;
pub mod state;
pub mod telemetry;
pub mod termination;
