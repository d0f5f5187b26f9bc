//! ZIP archive handling for CMS bundles.

use std::io::{Cursor, Read};

use cmspipe_types::SourceError;

/// ZIP local-file-header magic.
pub const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// True when the bytes look like a ZIP container (which includes
/// XLSX; see [`is_xlsx`]).
#[must_use]
pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(&ZIP_MAGIC)
}

/// XLSX is a ZIP whose first members include `[Content_Types].xml`.
#[must_use]
pub fn is_xlsx(bytes: &[u8]) -> bool {
    if !is_zip(bytes) {
        return false;
    }
    match list_members(bytes) {
        Ok(names) => names.iter().any(|n| n == "[Content_Types].xml"),
        Err(_) => false,
    }
}

/// List member names without extracting.
pub fn list_members(bytes: &[u8]) -> Result<Vec<String>, SourceError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| SourceError::ArchiveUnreadable {
            filename: "<zip>".to_string(),
            reason: e.to_string(),
        })?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let member = archive
            .by_index(i)
            .map_err(|e| SourceError::ArchiveUnreadable {
                filename: "<zip>".to_string(),
                reason: e.to_string(),
            })?;
        names.push(member.name().to_string());
    }
    Ok(names)
}

/// Extract one member's bytes by exact name.
pub fn extract_member(
    bytes: &[u8],
    archive_name: &str,
    member: &str,
) -> Result<Vec<u8>, SourceError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| SourceError::ArchiveUnreadable {
            filename: archive_name.to_string(),
            reason: e.to_string(),
        })?;
    let mut file = archive
        .by_name(member)
        .map_err(|_| SourceError::MissingMember {
            archive: archive_name.to_string(),
            member: member.to_string(),
        })?;
    let mut out = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut out)
        .map_err(|e| SourceError::ArchiveUnreadable {
            filename: archive_name.to_string(),
            reason: e.to_string(),
        })?;
    Ok(out)
}

/// Extract the single member whose lowercase name ends with one of
/// the given suffixes, preferring earlier suffixes and larger files
/// within a suffix.
pub fn extract_by_suffix(
    bytes: &[u8],
    archive_name: &str,
    suffixes: &[&str],
) -> Result<(String, Vec<u8>), SourceError> {
    let names = list_members(bytes)?;
    for suffix in suffixes {
        let mut candidates: Vec<&String> = names
            .iter()
            .filter(|n| n.to_lowercase().ends_with(suffix) && !n.ends_with('/'))
            .collect();
        if candidates.is_empty() {
            continue;
        }
        candidates.sort();
        let chosen = candidates[0].clone();
        let content = extract_member(bytes, archive_name, &chosen)?;
        return Ok((chosen, content));
    }
    Err(SourceError::MissingMember {
        archive: archive_name.to_string(),
        member: format!("*{}", suffixes.join(" | *")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            for (name, content) in members {
                writer
                    .start_file(name.to_string(), SimpleFileOptions::default())
                    .unwrap();
                writer.write_all(content).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn detects_zip_and_not_text() {
        let z = build_zip(&[("a.txt", b"hello")]);
        assert!(is_zip(&z));
        assert!(!is_zip(b"cf_type,cf_value\n"));
    }

    #[test]
    fn xlsx_detection_requires_content_types() {
        let plain = build_zip(&[("a.txt", b"hello")]);
        assert!(!is_xlsx(&plain));
        let xlsx = build_zip(&[("[Content_Types].xml", b"<Types/>"), ("xl/workbook.xml", b"<x/>")]);
        assert!(is_xlsx(&xlsx));
    }

    #[test]
    fn extract_by_suffix_prefers_first_suffix() {
        let z = build_zip(&[("readme.pdf", b"pdf"), ("ZIP5_OCT2025.txt", b"data")]);
        let (name, content) = extract_by_suffix(&z, "bundle.zip", &[".txt", ".csv"]).unwrap();
        assert_eq!(name, "ZIP5_OCT2025.txt");
        assert_eq!(content, b"data");
    }

    #[test]
    fn missing_member_is_reported() {
        let z = build_zip(&[("readme.pdf", b"pdf")]);
        let err = extract_by_suffix(&z, "bundle.zip", &[".txt"]).unwrap_err();
        assert!(matches!(err, SourceError::MissingMember { .. }));
    }
}
