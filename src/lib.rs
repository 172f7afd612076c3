//! Simulation of rotating beam choppers on a neutron time-of-flight
//! instrument.
//!
//! A [`Chopper`] turns its rotational geometry (frequency, phase, rotation
//! direction and angular cutouts) into the absolute times at which the
//! beam can pass, via [`Chopper::open_close_times`]. Transport code uses
//! those gating windows to decide which neutrons get through, and records
//! the outcome in a [`NeutronData`] with two independent blocking masks:
//! one for the component itself and one for everything else in the beam
//! path. [`ReadingField`] views expose each recorded quantity with
//! statistics that only ever look at unblocked neutrons.

/// Chopper geometry and gating windows.
pub mod chopper;
/// Per-neutron data and mask-aware field statistics.
pub mod reading;

pub use chopper::{Chopper, ChopperError, ChopperReading, Direction, GatingWindow};
pub use reading::{ComponentReading, EmptySelection, NeutronData, ReadingField};
