/// Extension every file created through `/api/create_file` must carry.
pub const TEXT_FILE_EXTENSION: &str = ".txt";

/// Lowest and highest accepted listen ports.
pub const MIN_PORT: u16 = 80;
pub const MAX_PORT: u16 = 65535;

/// Validate a single directory-entry name supplied by a client.
///
/// Rules:
/// - not empty after trimming
/// - no path separators (`/`, `\`)
/// - no parent-directory segment (`..` anywhere in the name)
/// - no NUL byte
/// - not `.` (the current directory)
pub fn validate_entry_name(name: &str) -> Result<(), &'static str> {
    if name.trim().is_empty() {
        return Err("Name cannot be empty");
    }

    if name.contains('/') || name.contains('\\') {
        return Err("Name cannot contain path separators");
    }

    if name.contains("..") {
        return Err("Name cannot contain parent-directory segments");
    }

    if name.contains('\0') || name == "." {
        return Err("Invalid name");
    }

    Ok(())
}

/// Validate a filename for `/api/create_file`: a safe entry name ending in `.txt`.
pub fn validate_text_filename(name: &str) -> Result<(), &'static str> {
    if !name.ends_with(TEXT_FILE_EXTENSION) {
        return Err("Only .txt files are allowed");
    }
    validate_entry_name(name)
}

pub fn validate_port(port: u16) -> Result<u16, String> {
    if port < MIN_PORT {
        return Err(format!(
            "Port {} is out of range ({}-{})",
            port, MIN_PORT, MAX_PORT
        ));
    }
    Ok(port)
}
