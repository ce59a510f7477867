//! Tests for path utility helpers.

use super::super::*;
use crate::test_support::EnvGuard;

#[test]
fn expand_tilde_expands_home_prefix() {
    let _guard = EnvGuard::set_var("HOME", "/home/tester");

    assert_eq!(expand_tilde("~/.ssh/id_ed25519"), "/home/tester/.ssh/id_ed25519");
}

#[test]
fn expand_tilde_leaves_absolute_paths_untouched() {
    assert_eq!(expand_tilde("/absolute/path"), "/absolute/path");
}

#[test]
fn expand_tilde_leaves_bare_tilde_untouched() {
    assert_eq!(expand_tilde("~"), "~");
}
