//! Handler for BCBS Florida
//!
//! BCBS-FL files are structurally standard but lean entirely on the
//! top-level provider-reference table; rate groups carry reference ids and
//! no inline groups. The streaming two-pass resolver covers that, so this
//! handler is a registered marker with identity behavior.

use crate::payers::PayerHandler;

pub struct BcbsFlHandler;

impl PayerHandler for BcbsFlHandler {
    fn name(&self) -> &'static str {
        "bcbs_fl"
    }
}
