//! `mau name` command implementation.

use crate::config::Config;
use crate::core::profile::UserProfile;
use crate::error::Result;

/// Run the name command. Without a name, prints the current one.
///
/// # Errors
///
/// Returns a validation error for blank or over-long names, or a storage
/// error if the name cannot be written.
pub fn run(config: &Config, name: Option<&str>) -> Result<()> {
    let mut profile = UserProfile::load(super::open_store(config)?)?;

    match name {
        Some(name) => {
            let stored = profile.set_user_name(name)?;
            println!("Name set to {stored}");
        }
        None => println!("{}", profile.user_name()),
    }
    Ok(())
}
