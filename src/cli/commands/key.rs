//! Key command - print the derived cache tag

use crate::cli::args::KeyArgs;
use crate::config::Config;
use crate::error::CracResult;
use crate::options::KeyOptions;

/// Execute the key command
pub async fn execute(args: KeyArgs, config: &Config) -> CracResult<()> {
    let opts = KeyOptions::resolve(&args.input, config)?;
    println!("{}", opts.derive_tag()?);
    Ok(())
}
