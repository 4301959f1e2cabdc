use std::path::{Path, PathBuf};

use super::constants::MAX_FILENAME_LENGTH;

/// Strip anything that would let a peer write outside the destination
/// directory: path components, control characters, reserved device names.
pub fn sanitize_file_name(file_name: &str) -> String {
    // Take the last component across both separator styles.
    let last = file_name.split(['/', '\\']).next_back().unwrap_or_default();

    let mut clean: String = last.chars().filter(|c| !c.is_control()).collect();

    // Windows reserved device names, checked whole-name and case-insensitive.
    const RESERVED: [&str; 22] = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
        "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];

    if clean == "." || clean == ".." || clean.trim().is_empty() {
        return "received_file".to_string();
    }
    if RESERVED.iter().any(|&r| clean.eq_ignore_ascii_case(r)) {
        return "received_file".to_string();
    }

    if clean.len() > MAX_FILENAME_LENGTH {
        let mut cutoff = MAX_FILENAME_LENGTH;
        while !clean.is_char_boundary(cutoff) {
            cutoff -= 1;
        }
        clean.truncate(cutoff);
    }
    clean
}

/// Deterministic collision handling: `name.ext`, `name (1).ext`,
/// `name (2).ext`, and so on. An existing file is never appended to or
/// silently replaced.
pub fn unique_dest_path(dest_dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dest_dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((s, e)) if !s.is_empty() => (s, Some(e)),
        _ => (file_name, None),
    };

    let mut n = 1u32;
    loop {
        let name = match ext {
            Some(ext) => format!("{} ({}).{}", stem, n, ext),
            None => format!("{} ({})", stem, n),
        };
        let candidate = dest_dir.join(name);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Human-readable transfer speed from a byte count and elapsed seconds.
pub fn format_transfer_speed(bytes_transferred: u64, elapsed_secs: f64) -> String {
    if elapsed_secs <= 0.0 {
        return "starting".to_string();
    }

    let speed_bps = bytes_transferred as f64 / elapsed_secs;
    if speed_bps > 1_000_000.0 {
        format!("{:.2} MB/s", speed_bps / 1_000_000.0)
    } else if speed_bps > 1_000.0 {
        format!("{:.1} KB/s", speed_bps / 1_000.0)
    } else {
        format!("{:.0} B/s", speed_bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_plain_names() {
        assert_eq!(sanitize_file_name("notes.txt"), "notes.txt");
        assert_eq!(sanitize_file_name("archive.tar.gz"), "archive.tar.gz");
    }

    #[test]
    fn sanitize_strips_path_components() {
        assert_eq!(sanitize_file_name("path/to/file.txt"), "file.txt");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Windows\\calc.exe"), "calc.exe");
        assert_eq!(sanitize_file_name("folder\\../file.txt"), "file.txt");
    }

    #[test]
    fn sanitize_rejects_dangerous_names() {
        assert_eq!(sanitize_file_name(".."), "received_file");
        assert_eq!(sanitize_file_name("."), "received_file");
        assert_eq!(sanitize_file_name(""), "received_file");
        assert_eq!(sanitize_file_name("/"), "received_file");
        assert_eq!(sanitize_file_name("   "), "received_file");
        assert_eq!(sanitize_file_name("CON"), "received_file");
        assert_eq!(sanitize_file_name("nul"), "received_file");
        // Not reserved, just similar.
        assert_eq!(sanitize_file_name("concert.txt"), "concert.txt");
    }

    #[test]
    fn sanitize_truncates_on_char_boundary() {
        let mut long = "🦀".repeat(100);
        long.push_str(".txt");
        let sanitized = sanitize_file_name(&long);
        assert!(sanitized.len() <= MAX_FILENAME_LENGTH);
        assert!(sanitized.chars().last().is_some());
    }

    #[test]
    fn unique_path_appends_counter() {
        let dir = std::env::temp_dir().join(format!("lancat_utils_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        assert_eq!(unique_dest_path(&dir, "a.txt"), dir.join("a.txt"));
        std::fs::write(dir.join("a.txt"), b"x").unwrap();
        assert_eq!(unique_dest_path(&dir, "a.txt"), dir.join("a (1).txt"));
        std::fs::write(dir.join("a (1).txt"), b"x").unwrap();
        assert_eq!(unique_dest_path(&dir, "a.txt"), dir.join("a (2).txt"));

        std::fs::write(dir.join("noext"), b"x").unwrap();
        assert_eq!(unique_dest_path(&dir, "noext"), dir.join("noext (1)"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn speed_formatting() {
        assert_eq!(format_transfer_speed(500, 1.0), "500 B/s");
        assert_eq!(format_transfer_speed(2_000, 1.0), "2.0 KB/s");
        assert_eq!(format_transfer_speed(3_000_000, 1.0), "3.00 MB/s");
        assert_eq!(format_transfer_speed(1000, 0.0), "starting");
    }
}
