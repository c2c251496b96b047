use uuid::Uuid;

pub type RunId = String;

/// Generate a unique id for one backup run
///
/// Format: backup-{timestamp}-{random}
/// Example: backup-1761520471-a3f9b2
pub fn generate_run_id() -> RunId {
    let timestamp = chrono::Utc::now().timestamp();
    let random = &Uuid::new_v4().simple().to_string()[..6];

    format!("backup-{}-{}", timestamp, random)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_format() {
        let run_id = generate_run_id();

        let parts: Vec<&str> = run_id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "backup");

        // Timestamp should be numeric
        assert!(parts[1].parse::<i64>().is_ok());

        // Random should be 6 hex chars
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_run_id_uniqueness() {
        assert_ne!(generate_run_id(), generate_run_id());
    }
}
