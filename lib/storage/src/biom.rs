use amquery_core::{Error, Result};
use std::path::Path;

/// Merges a new sample table into the master table recorded for an index.
/// Table formats are left to the implementation.
pub trait TableMerger {
    fn merge(&self, master: &Path, additional: &Path) -> Result<()>;
}

impl<F> TableMerger for F
where
    F: Fn(&Path, &Path) -> Result<()>,
{
    fn merge(&self, master: &Path, additional: &Path) -> Result<()> {
        self(master, additional)
    }
}

/// Tables to merge on `add`, or `None` when there are none.
/// Exactly one of the two being present is an error.
pub fn merge_pair<'a>(master: Option<&'a Path>, additional: Option<&'a Path>) -> Result<Option<(&'a Path, &'a Path)>> {
    match (master, additional) {
        (Some(master), Some(additional)) => Ok(Some((master, additional))),
        (None, None) => Ok(None),
        (Some(_), None) => Err(Error::InconsistentBiomState {
            master: "present",
            additional: "missing",
        }),
        (None, Some(_)) => Err(Error::InconsistentBiomState {
            master: "missing",
            additional: "present",
        }),
    }
}
