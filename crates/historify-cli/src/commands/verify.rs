//! `verify` - validate signatures, chain continuity and file content.

use std::path::Path;

use historify_chain::{Verifier, VerifyOptions};
use historify_core::LockMode;

use super::{CommandError, archive_for, open_repo, resolved_roots, signer_for, store_for};
use crate::theme;

pub(crate) fn run(repo_path: &Path, full_chain: bool, files: bool) -> anyhow::Result<()> {
    let repo = open_repo(repo_path)?;
    let _lock = repo.lock(LockMode::Shared)?;

    let store = store_for(&repo);
    let signer = signer_for(&repo);
    let archive = archive_for(&repo);
    let roots = resolved_roots(&repo, None)?;

    let verifier = Verifier::new(
        &store,
        &signer,
        &archive,
        repo.seed_path(),
        repo.integrity_path(),
    )
    .with_roots(roots);

    let report = verifier.run(VerifyOptions {
        full_chain,
        check_files: files,
    })?;

    println!("{}", theme::header(&format!("Verification ({})", report.scope)));
    println!("  logs checked: {}", report.logs_checked);
    if files {
        println!("  files checked: {}", report.files_checked);
    }
    if report.index_rebuilt {
        println!("  {}", theme::warning("integrity index was rebuilt from logs"));
    }

    if report.ok() {
        println!("{}", theme::success("chain verified"));
        return Ok(());
    }

    println!("{}", theme::separator());
    for failure in &report.failures {
        println!("  {}", theme::error(&failure.to_string()));
    }
    Err(CommandError::VerificationFailed {
        failures: report.failures.len(),
    }
    .into())
}
