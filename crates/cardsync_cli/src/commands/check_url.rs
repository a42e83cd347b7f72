//! Check-url command implementation.

use super::CliResult;
use cardsync_security::UrlGuard;

/// Runs the check-url command.
pub fn run(url: &str) -> CliResult {
    let validated = UrlGuard::new().validate(url)?;
    println!("allowed: {}", validated.url);
    for ip in &validated.resolved {
        println!("  {ip}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_addresses_need_no_dns() {
        assert!(run("https://93.184.216.34/dav/").is_ok());
        assert!(run("http://127.0.0.1:5232/").is_err());
        assert!(run("http://[::1]/").is_err());
        assert!(run("file:///etc/passwd").is_err());
    }
}
