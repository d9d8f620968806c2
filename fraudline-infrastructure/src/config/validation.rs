use anyhow::{anyhow, Result};

pub fn ensure_positive(name: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(anyhow!("{} must be greater than 0", name));
    }
    Ok(())
}

pub fn validate_webhook_url(value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("alert webhook url is empty"));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(anyhow!("alert webhook url must be http(s): {}", trimmed));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_url_must_be_http() {
        assert!(validate_webhook_url("https://hooks.example.com/fraud").is_ok());
        assert!(validate_webhook_url("ws://hooks.example.com").is_err());
        assert!(validate_webhook_url(" ").is_err());
    }
}
