use std::path::Path;

use anyhow::Context;
use sitewatch_common::model::Verdict;
use sitewatch_common::success;
use sitewatch_core::store::{FileTargetStore, TargetStore};

use crate::terminal::print;

pub fn reset(list: &Path, only: Option<Verdict>) -> anyhow::Result<()> {
    let store = FileTargetStore::open(list)
        .with_context(|| format!("cannot open target list {}", list.display()))?;

    print::header("resetting marks");
    let cleared = store.reset_marks(only)?;
    match only {
        Some(verdict) => success!("cleared {cleared} '{verdict}' marks in {}", list.display()),
        None => success!("cleared {cleared} marks in {}", list.display()),
    }
    if cleared > 0 {
        print::print_status(format!("original kept at {}", store.backup_path().display()));
    }
    print::end_of_program();
    Ok(())
}
