use std::path::Path;

use anyhow::Context;
use colored::*;
use sitewatch_common::model::{Target, Verdict};
use sitewatch_core::store::{FileTargetStore, TargetStore};

use crate::terminal::{colors, print};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct MarkCounts {
    pub total: usize,
    pub unmarked: usize,
    pub unreachable: usize,
    pub low_growth: usize,
    pub high_growth: usize,
}

impl MarkCounts {
    pub fn tally(targets: &[Target]) -> Self {
        let mut counts = MarkCounts {
            total: targets.len(),
            ..MarkCounts::default()
        };
        for target in targets {
            match target.mark {
                None => counts.unmarked += 1,
                Some(Verdict::Unreachable) => counts.unreachable += 1,
                Some(Verdict::ReachableLowGrowth) => counts.low_growth += 1,
                Some(Verdict::ReachableHighGrowth) => counts.high_growth += 1,
            }
        }
        counts
    }

    pub fn marked(&self) -> usize {
        self.total - self.unmarked
    }
}

pub fn status(list: &Path) -> anyhow::Result<()> {
    let store = FileTargetStore::open(list)
        .with_context(|| format!("cannot open target list {}", list.display()))?;
    let counts = MarkCounts::tally(&store.load()?);

    print::header("target list status");
    print::aligned_line("target list", list.display().to_string());
    print::aligned_line("entries", counts.total.to_string());
    print::aligned_line("unmarked", counts.unmarked.to_string().color(colors::ACCENT));
    print::aligned_line("marked", counts.marked().to_string());
    print::as_tree_one_level(vec![
        ("0 unreachable".to_string(), counts.unreachable.to_string().color(colors::UNREACHABLE)),
        ("1 low growth".to_string(), counts.low_growth.to_string().color(colors::REACHABLE)),
        ("2 high growth".to_string(), counts.high_growth.to_string().color(colors::HIGH_GROWTH).bold()),
    ]);
    print::end_of_program();
    Ok(())
}
