// CSV site-registry import

use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use roster_ingest::model::CanonicalSite;

/// One line of a site registry file:
/// `full_name,generic_name,municipality,industrialized,code`.
#[derive(Debug, Deserialize)]
struct SiteCsvRow {
    full_name: String,
    #[serde(default)]
    generic_name: Option<String>,
    municipality: String,
    #[serde(default)]
    industrialized: Option<String>,
    code: String,
}

pub fn import_sites(path: &Path) -> Result<Vec<CanonicalSite>, String> {
    let content = read_file_as_utf8(path)?;
    let delimiter = sniff_delimiter(&content);
    sites_from_string(&content, delimiter)
}

fn sites_from_string(content: &str, delimiter: u8) -> Result<Vec<CanonicalSite>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    // Headers are matched case-insensitively
    let headers = reader.headers().map_err(|e| e.to_string())?.clone();
    let lowered: csv::StringRecord = headers.iter().map(|h| h.to_lowercase()).collect();
    reader.set_headers(lowered);

    let mut sites = Vec::new();
    for (i, result) in reader.deserialize::<SiteCsvRow>().enumerate() {
        // Line 1 is the header
        let row = result.map_err(|e| format!("line {}: {}", i + 2, e))?;
        if row.full_name.is_empty() || row.code.is_empty() {
            log::warn!("line {}: site without name or code skipped", i + 2);
            continue;
        }
        sites.push(CanonicalSite {
            full_name: row.full_name,
            generic_name: row.generic_name.filter(|g| !g.is_empty()),
            municipality: row.municipality,
            industrialized: row.industrialized.as_deref().map(parse_flag).unwrap_or(false),
            code: row.code,
        });
    }
    Ok(sites)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "si" | "sí" | "s" | "x" | "yes" | "y"
    )
}

/// Columns a registry file is expected to carry, lowercased.
const SITE_COLUMNS: &[&str] =
    &["full_name", "generic_name", "municipality", "industrialized", "code"];

/// Pick the delimiter under which the header line names the most registry
/// columns. Excel in Spanish locales saves `;`, hand-made files use `,`.
/// Ties and headers with no known column fall back to `,`.
fn sniff_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or("");
    let known = |delim: u8| {
        header
            .split(delim as char)
            .map(|h| h.trim().trim_matches('"').to_lowercase())
            .filter(|h| SITE_COLUMNS.contains(&h.as_str()))
            .count()
    };

    [b',', b';', b'\t', b'|']
        .into_iter()
        .map(|d| (d, known(d)))
        .fold((b',', 0), |best, (d, n)| if n > best.1 { (d, n) } else { best })
        .0
}

/// Read file and convert to UTF-8 if needed (registry exports are often Windows-1252)
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| e.to_string())?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s.trim_start_matches('\u{feff}').to_string()),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}
