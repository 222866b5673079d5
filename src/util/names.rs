/// Checks if a string adheres to the ZTF naming scheme, e.g. `ZTF19aatubsj`
pub fn is_ztf_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == 12
        && name.starts_with("ZTF")
        && matches!(bytes[3], b'1' | b'2')
        && bytes[4].is_ascii_digit()
        && bytes[5..].iter().all(u8::is_ascii_lowercase)
}

/// Checks if a string adheres to the TNS naming scheme, e.g. `2023aew`, `AT2023aew` or `SN 2019abcd`
pub fn is_tns_name(name: &str) -> bool {
    let stripped = name
        .strip_prefix("AT")
        .or_else(|| name.strip_prefix("SN"))
        .map(str::trim_start)
        .unwrap_or(name);

    let bytes = stripped.as_bytes();
    if !(7..=8).contains(&bytes.len()) {
        return false;
    }

    (stripped.starts_with("19") || stripped.starts_with("20"))
        && bytes[2..4].iter().all(u8::is_ascii_digit)
        && bytes[4..].iter().all(u8::is_ascii_lowercase)
}

/// Splits names into well formed ZTF names and the rest, keeping the input order
pub fn partition_names<S: AsRef<str>>(names: &[S]) -> (Vec<String>, Vec<String>) {
    names
        .iter()
        .map(|n| n.as_ref().to_string())
        .partition(|n| is_ztf_name(n))
}
