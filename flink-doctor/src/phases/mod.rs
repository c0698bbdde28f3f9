//! The diagnostic pipeline for a single request: `sense` pulls raw metric points, `normalize`
//! types them, and `diagnose` evaluates the rules over the typed values.

pub mod diagnose;
pub mod normalize;
pub mod sense;
