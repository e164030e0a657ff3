//! Search query parameters
//!
//! `GET /api/query?q=(raw|reqinfo)&pageNo=0&pageSize=50&timeAsc|timeDesc&timeStart=...&export=csv`

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 1000;

/// Which view of the stored events to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Full audit payloads
    Raw,
    /// Derived per-request columns
    RequestInfo,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::RequestInfo => "reqinfo",
        }
    }
}

/// Response encoding for search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
    Ndjson,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
            // Ref: https://github.com/ndjson/ndjson-spec
            Self::Ndjson => "application/x-ndjson",
        }
    }

    /// `Content-Disposition` for download formats.
    pub fn content_disposition(&self) -> Option<&'static str> {
        match self {
            Self::Json => None,
            Self::Csv => Some("attachment; filename=logs-export.csv"),
            Self::Ndjson => Some("attachment; filename=logs-export.ndjson"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// One parsed and validated search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub kind: QueryKind,
    pub export_format: ExportFormat,
    pub page_number: u64,
    pub page_size: u32,
    pub sort: SortOrder,
    pub time_start: Option<DateTime<Utc>>,
    pub time_end: Option<DateTime<Utc>>,
}

impl SearchQuery {
    pub fn new(kind: QueryKind) -> Self {
        Self {
            kind,
            export_format: ExportFormat::default(),
            page_number: 0,
            page_size: DEFAULT_PAGE_SIZE,
            sort: SortOrder::default(),
            time_start: None,
            time_end: None,
        }
    }

    /// Row offset of the first result on the requested page.
    pub fn offset(&self) -> u64 {
        self.page_number * u64::from(self.page_size)
    }

    /// Build a query from decoded query-string parameters.
    ///
    /// `timeAsc` and `timeDesc` are presence flags; their values are ignored.
    pub fn from_params(
        params: &HashMap<String, String>,
        max_page_size: u32,
    ) -> Result<Self, QueryParamError> {
        let kind = match params.get("q").map(String::as_str) {
            Some("raw") => QueryKind::Raw,
            Some("reqinfo") => QueryKind::RequestInfo,
            other => {
                return Err(QueryParamError::InvalidKind(
                    other.unwrap_or_default().to_string(),
                ))
            }
        };

        let export_format = match params.get("export").map(String::as_str) {
            None | Some("") | Some("json") => ExportFormat::Json,
            Some("csv") => ExportFormat::Csv,
            Some("ndjson") => ExportFormat::Ndjson,
            Some(other) => return Err(QueryParamError::InvalidExportFormat(other.to_string())),
        };

        let page_number = match params.get("pageNo") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| QueryParamError::InvalidPageNumber(raw.clone()))?,
            None => 0,
        };

        let page_size = match params.get("pageSize") {
            Some(raw) => {
                let size = raw
                    .parse::<u32>()
                    .map_err(|_| QueryParamError::InvalidPageSize(raw.clone()))?;
                if size == 0 || size > max_page_size {
                    return Err(QueryParamError::PageSizeOutOfRange {
                        value: size,
                        max: max_page_size,
                    });
                }
                size
            }
            None => DEFAULT_PAGE_SIZE.min(max_page_size),
        };

        // Offsets are bound as SQLite integers
        match page_number.checked_mul(u64::from(page_size)) {
            Some(offset) if offset <= i64::MAX as u64 => {}
            _ => return Err(QueryParamError::InvalidPageNumber(page_number.to_string())),
        }

        let sort = match (params.contains_key("timeAsc"), params.contains_key("timeDesc")) {
            (true, true) => return Err(QueryParamError::ConflictingSortOrder),
            (true, false) => SortOrder::Ascending,
            _ => SortOrder::Descending,
        };

        let time_start = parse_time(params, "timeStart")?;
        let time_end = parse_time(params, "timeEnd")?;
        if let (Some(start), Some(end)) = (time_start, time_end) {
            if start > end {
                return Err(QueryParamError::EmptyTimeRange);
            }
        }

        Ok(Self {
            kind,
            export_format,
            page_number,
            page_size,
            sort,
            time_start,
            time_end,
        })
    }
}

fn parse_time(
    params: &HashMap<String, String>,
    name: &'static str,
) -> Result<Option<DateTime<Utc>>, QueryParamError> {
    match params.get(name).map(String::as_str) {
        None | Some("") => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| QueryParamError::InvalidTime {
                param: name,
                value: raw.to_string(),
                reason: e.to_string(),
            }),
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "q={} page={} size={} sort={}",
            self.kind.as_str(),
            self.page_number,
            self.page_size,
            self.sort.sql_keyword()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryParamError {
    #[error("invalid query name: {0:?} (expected raw or reqinfo)")]
    InvalidKind(String),

    #[error("invalid export format: {0:?} (expected json, csv or ndjson)")]
    InvalidExportFormat(String),

    #[error("invalid pageNo: {0:?}")]
    InvalidPageNumber(String),

    #[error("invalid pageSize: {0:?}")]
    InvalidPageSize(String),

    #[error("pageSize {value} out of range (1..={max})")]
    PageSizeOutOfRange { value: u32, max: u32 },

    #[error("only one of timeAsc or timeDesc may be given")]
    ConflictingSortOrder,

    #[error("invalid {param} {value:?}: {reason}")]
    InvalidTime {
        param: &'static str,
        value: String,
        reason: String,
    },

    #[error("timeStart is after timeEnd")]
    EmptyTimeRange,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn parse(pairs: &[(&str, &str)]) -> Result<SearchQuery, QueryParamError> {
        SearchQuery::from_params(&params(pairs), DEFAULT_MAX_PAGE_SIZE)
    }

    #[test]
    fn test_defaults() {
        let query = parse(&[("q", "raw")]).unwrap();
        assert_eq!(query, SearchQuery::new(QueryKind::Raw));
        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn test_full_query() {
        let query = parse(&[
            ("q", "reqinfo"),
            ("pageNo", "3"),
            ("pageSize", "50"),
            ("timeAsc", ""),
            ("timeStart", "2024-03-01T00:00:00+02:00"),
            ("timeEnd", "2024-03-02T00:00:00Z"),
            ("export", "ndjson"),
        ])
        .unwrap();

        assert_eq!(query.kind, QueryKind::RequestInfo);
        assert_eq!(query.page_number, 3);
        assert_eq!(query.page_size, 50);
        assert_eq!(query.offset(), 150);
        assert_eq!(query.sort, SortOrder::Ascending);
        assert_eq!(query.export_format, ExportFormat::Ndjson);
        assert_eq!(
            query.time_start.unwrap().to_rfc3339(),
            "2024-02-29T22:00:00+00:00"
        );
    }

    #[test]
    fn test_invalid_kind() {
        assert!(matches!(parse(&[]), Err(QueryParamError::InvalidKind(_))));
        assert!(matches!(
            parse(&[("q", "everything")]),
            Err(QueryParamError::InvalidKind(_))
        ));
    }

    #[test]
    fn test_invalid_paging() {
        assert!(matches!(
            parse(&[("q", "raw"), ("pageNo", "-1")]),
            Err(QueryParamError::InvalidPageNumber(_))
        ));
        assert!(matches!(
            parse(&[("q", "raw"), ("pageSize", "ten")]),
            Err(QueryParamError::InvalidPageSize(_))
        ));
        assert!(matches!(
            parse(&[("q", "raw"), ("pageSize", "0")]),
            Err(QueryParamError::PageSizeOutOfRange { .. })
        ));
        assert!(matches!(
            parse(&[("q", "raw"), ("pageSize", "1001")]),
            Err(QueryParamError::PageSizeOutOfRange { max: 1000, .. })
        ));
        assert!(parse(&[("q", "raw"), ("pageNo", &u64::MAX.to_string())]).is_err());
    }

    #[test]
    fn test_sort_order() {
        assert_eq!(parse(&[("q", "raw"), ("timeDesc", "")]).unwrap().sort, SortOrder::Descending);
        assert_eq!(parse(&[("q", "raw"), ("timeAsc", "1")]).unwrap().sort, SortOrder::Ascending);
        assert_eq!(
            parse(&[("q", "raw"), ("timeAsc", ""), ("timeDesc", "")]),
            Err(QueryParamError::ConflictingSortOrder)
        );
    }

    #[test]
    fn test_time_bounds() {
        assert!(matches!(
            parse(&[("q", "raw"), ("timeStart", "last tuesday")]),
            Err(QueryParamError::InvalidTime { param: "timeStart", .. })
        ));
        assert_eq!(
            parse(&[
                ("q", "raw"),
                ("timeStart", "2024-03-02T00:00:00Z"),
                ("timeEnd", "2024-03-01T00:00:00Z"),
            ]),
            Err(QueryParamError::EmptyTimeRange)
        );
    }

    #[test]
    fn test_export_formats() {
        assert_eq!(parse(&[("q", "raw"), ("export", "csv")]).unwrap().export_format, ExportFormat::Csv);
        assert_eq!(parse(&[("q", "raw"), ("export", "json")]).unwrap().export_format, ExportFormat::Json);
        assert!(matches!(
            parse(&[("q", "raw"), ("export", "xml")]),
            Err(QueryParamError::InvalidExportFormat(_))
        ));
    }

    #[test]
    fn test_export_headers() {
        assert_eq!(ExportFormat::Csv.content_type(), "text/csv");
        assert_eq!(
            ExportFormat::Csv.content_disposition(),
            Some("attachment; filename=logs-export.csv")
        );
        assert_eq!(ExportFormat::Ndjson.content_type(), "application/x-ndjson");
        assert_eq!(
            ExportFormat::Ndjson.content_disposition(),
            Some("attachment; filename=logs-export.ndjson")
        );
        assert_eq!(ExportFormat::Json.content_type(), "application/json");
        assert_eq!(ExportFormat::Json.content_disposition(), None);
    }

    #[test]
    fn test_small_max_page_size_caps_default() {
        let query = SearchQuery::from_params(&params(&[("q", "raw")]), 5).unwrap();
        assert_eq!(query.page_size, 5);
    }
}
