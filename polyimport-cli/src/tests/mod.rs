//! Shared test harness modules for the polyimport CLI.

use super::*;

mod helpers;
mod steps;
