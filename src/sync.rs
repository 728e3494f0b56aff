use std::fmt::{self, Display};

use crate::snapshot::{BackupKey, CandidateSet, CatalogEntry};

/// What a holder of a local snapshot should do about the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    NoRemote,
    UpToDate,
    Import(CatalogEntry),
    /// The caller has to pick: either the remote candidates diverge, or the
    /// local snapshot ranks above the remote one.
    Conflict {
        local: Option<BackupKey>,
        remotes: Vec<CatalogEntry>,
    },
}

pub fn reconcile(local: Option<&BackupKey>, remote: &CandidateSet) -> Verdict {
    if remote.is_divergent() {
        return Verdict::Conflict {
            local: local.cloned(),
            remotes: remote.iter().cloned().collect(),
        };
    }

    let latest = remote.latest();
    let local = match local {
        Some(val) => val,
        None => return Verdict::Import(latest.clone()),
    };

    if local == latest.key() {
        return Verdict::UpToDate;
    }

    let remote_key = latest.key();
    let is_newer = remote_key.timestamp() > local.timestamp();
    let is_same_time_and_later = remote_key.timestamp() == local.timestamp()
        && remote_key.iteration() >= local.iteration();

    if is_newer || is_same_time_and_later {
        Verdict::Import(latest.clone())
    } else {
        Verdict::Conflict {
            local: Some(local.clone()),
            remotes: vec![latest.clone()],
        }
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Verdict::NoRemote => write!(f, "no remote backups"),
            Verdict::UpToDate => write!(f, "up to date"),
            Verdict::Import(entry) => write!(f, "import {}", entry.raw_key()),
            Verdict::Conflict { local, remotes } => {
                write!(f, "conflict")?;
                if let Some(local) = local {
                    write!(f, "; local {}", local)?;
                }
                for it in remotes {
                    write!(f, "; remote {}", it.raw_key())?;
                }
                Ok(())
            }
        }
    }
}
