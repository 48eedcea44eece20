//! Implementation of the `nslock status` command.

use super::connect;
use crate::cli::StatusArgs;
use nslock::config::Config;
use nslock::error::Result;
use nslock::executor::list_contenders;
use nslock::namespace::Namespace;

/// Print the holder and waiters of a lock path.
pub(super) fn cmd_status(args: StatusArgs, config: &Config) -> Result<()> {
    let namespace = connect(&args.target, config)?;
    let report = render_status(&namespace, &args.target.lock_path, &config.contender_prefix)?;
    print!("{}", report);
    Ok(())
}

/// A missing lock path has no contenders.
fn render_status<N: Namespace>(namespace: &N, lock_path: &str, prefix: &str) -> Result<String> {
    let contenders = match list_contenders(namespace, lock_path, prefix) {
        Ok(contenders) => contenders,
        Err(e) if e.is_no_node() => Vec::new(),
        Err(e) => return Err(e),
    };

    if contenders.is_empty() {
        return Ok("No contenders.\n".to_string());
    }

    let mut out = format!("Contenders for '{}':\n", lock_path);
    for contender in &contenders {
        out.push_str(&format!("  {}\n", contender));
    }
    Ok(out)
}
