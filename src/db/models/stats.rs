use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TopSite {
    pub url: String,
    pub title: Option<String>,
    pub time: i64,
}

/// Aggregates for one calendar day.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyStats {
    pub sites_visited: i64,
    pub total_time_seconds: i64,
    pub top_sites: Vec<TopSite>,
    pub search_queries: i64,
    pub applications_used: i64,
}
