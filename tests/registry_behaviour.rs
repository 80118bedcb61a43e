//! Behavioural scenarios for the volume registry lifecycle.

mod registry;
