//! Column name canonicalization.

use std::collections::BTreeMap;

/// Long-form Dublin Core column names and their canonical short names.
const DCTERMS_RENAMES: &[(&str, &str)] = &[
    ("dcterms.alternative", "alternative"),
    ("dcterms.bibliographicCitation", "bibliographic_citation"),
    ("dcterms.conformsTo", "conforms_to"),
    ("dcterms.contributor", "contributor"),
    ("dcterms.coverage", "coverage"),
    ("dcterms.created", "created"),
    ("dcterms.creator", "creator"),
    ("dcterms.date", "date"),
    ("dcterms.description", "description"),
    ("dcterms.extent", "extent"),
    ("dcterms.format", "format"),
    ("dcterms.hasFormat", "has_format"),
    ("dcterms.hasPart", "has_part"),
    ("dcterms.hasVersion", "has_version"),
    ("dcterms.identifier", "identifier"),
    ("dcterms.isFormatOf", "is_format_of"),
    ("dcterms.isPartOf", "belongs_to"),
    ("dcterms.isVersionOf", "is_version_of"),
    ("dcterms.language", "language"),
    ("dcterms.license", "license"),
    ("dcterms.medium", "medium"),
    ("dcterms.provenance", "provenance"),
    ("dcterms.publisher", "publisher"),
    ("dcterms.references", "reference"),
    ("dcterms.relation", "related_url"),
    ("dcterms.rights", "rights_statement"),
    ("dcterms.source", "source"),
    ("dcterms.spatial", "location"),
    ("dcterms.subject", "subject"),
    ("dcterms.rightsHolder", "rights_holder"),
    ("dcterms.temporal", "temporal"),
    ("dcterms.title", "title"),
    ("dcterms.type", "resource_type"),
];

pub fn default_header_renames() -> BTreeMap<String, String> {
    DCTERMS_RENAMES
        .iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect()
}

/// Canonical name for a header cell; unknown headers are returned trimmed.
pub fn rename_header(renames: &BTreeMap<String, String>, header: &str) -> String {
    let header = header.trim();
    renames
        .get(header)
        .cloned()
        .unwrap_or_else(|| header.to_string())
}

/// Trim a cell and strip one pair of surrounding double quotes.
pub fn clean_cell(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}
