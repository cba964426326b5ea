//! Sign-in and sign-out.

use std::io::Write;

use anyhow::{Context, Result};

use uc_core::Credential;
use uc_db::Database;

use crate::AppState;

pub fn login<W: Write>(
    writer: &mut W,
    db: &mut Database,
    state: &mut AppState,
    credential: Credential,
) -> Result<()> {
    db.save_credential(&credential)
        .context("failed to store account")?;
    writeln!(writer, "Signed in as {}", credential.email)?;
    if credential.access_token.is_none() {
        writeln!(
            writer,
            "Calendar access will be requested on the next sync."
        )?;
    }
    state.account = Some(credential);
    Ok(())
}

pub fn logout<W: Write>(writer: &mut W, db: &mut Database, state: &mut AppState) -> Result<()> {
    let removed = db.clear_credential().context("failed to clear account")?;
    state.account = None;
    if removed {
        writeln!(writer, "Signed out")?;
    } else {
        writeln!(writer, "Not signed in")?;
    }
    Ok(())
}
