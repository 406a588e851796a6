use crate::config::ApiConfig;
use crate::error::{Error, SourceErrorKind};
use chrono::{Duration, NaiveDate};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::collections::HashMap;

/// One active, non-manager child account discovered under the MCC account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub name: String,
}

/// Inclusive extraction window over calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// The trailing 90-day window ending yesterday, excluding the current
    /// partial day.
    pub fn trailing_90_days(today: NaiveDate) -> Self {
        DateWindow {
            start: today - Duration::days(90),
            end: today - Duration::days(1),
        }
    }
}

/// The queryable source entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Campaign,
    AdGroup,
    GeographicView,
    SearchTermView,
    CustomerClient,
}

impl Entity {
    fn as_str(&self) -> &'static str {
        match self {
            Entity::Campaign => "campaign",
            Entity::AdGroup => "ad_group",
            Entity::GeographicView => "geographic_view",
            Entity::SearchTermView => "search_term_view",
            Entity::CustomerClient => "customer_client",
        }
    }
}

/// The campaign type lacking the ad-group subdivision; it gets its own query
/// shape and a placeholder ad-group label downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    PerformanceMax,
}

impl ChannelType {
    fn as_str(&self) -> &'static str {
        match self {
            ChannelType::PerformanceMax => "PERFORMANCE_MAX",
        }
    }
}

/// Optional campaign-type predicate on a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelFilter {
    Only(ChannelType),
    Excluding(ChannelType),
}

/// A typed query expression over one source entity: a fixed select list, an
/// optional date window and an optional campaign-type predicate. Rendered to
/// the source's query language by [`AdsQuery::to_gaql`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdsQuery {
    pub(crate) entity: Entity,
    pub(crate) fields: &'static [&'static str],
    pub(crate) window: Option<DateWindow>,
    pub(crate) channel: Option<ChannelFilter>,
    pub(crate) predicates: &'static [&'static str],
}

impl AdsQuery {
    /// Active, non-manager child accounts of an MCC account.
    pub fn child_accounts() -> Self {
        AdsQuery {
            entity: Entity::CustomerClient,
            fields: &[
                "customer_client.client_customer",
                "customer_client.descriptive_name",
            ],
            window: None,
            channel: None,
            predicates: &[
                "customer_client.status = 'ENABLED'",
                "customer_client.manager = FALSE",
            ],
        }
    }

    /// Daily budgets for every non-removed campaign; joined in memory with
    /// the ad-group metrics.
    pub fn campaign_budgets() -> Self {
        AdsQuery {
            entity: Entity::Campaign,
            fields: &["campaign.id", "campaign_budget.amount_micros"],
            window: None,
            channel: None,
            predicates: &["campaign.status != 'REMOVED'"],
        }
    }

    /// Clicks, impressions and cost per ad group and date for every campaign
    /// type that has the ad-group subdivision.
    pub fn ad_group_metrics(window: DateWindow) -> Self {
        AdsQuery {
            entity: Entity::AdGroup,
            fields: &[
                "campaign.id",
                "campaign.name",
                "campaign.status",
                "ad_group.id",
                "ad_group.name",
                "segments.date",
                "metrics.clicks",
                "metrics.impressions",
                "metrics.cost_micros",
            ],
            window: Some(window),
            channel: Some(ChannelFilter::Excluding(ChannelType::PerformanceMax)),
            predicates: &[],
        }
    }

    /// Conversions per ad group, date and conversion action.
    pub fn ad_group_conversions(window: DateWindow) -> Self {
        AdsQuery {
            entity: Entity::AdGroup,
            fields: &[
                "campaign.id",
                "ad_group.id",
                "segments.date",
                "segments.conversion_action_name",
                "metrics.conversions",
            ],
            window: Some(window),
            channel: Some(ChannelFilter::Excluding(ChannelType::PerformanceMax)),
            predicates: &[],
        }
    }

    /// Campaign-level metrics for Performance Max campaigns, which have no
    /// ad groups and carry their budget inline.
    pub fn campaign_metrics(window: DateWindow) -> Self {
        AdsQuery {
            entity: Entity::Campaign,
            fields: &[
                "campaign.id",
                "campaign.name",
                "campaign.status",
                "campaign_budget.amount_micros",
                "segments.date",
                "metrics.clicks",
                "metrics.impressions",
                "metrics.cost_micros",
            ],
            window: Some(window),
            channel: Some(ChannelFilter::Only(ChannelType::PerformanceMax)),
            predicates: &[],
        }
    }

    /// Campaign-level conversions for Performance Max campaigns.
    pub fn campaign_conversions(window: DateWindow) -> Self {
        AdsQuery {
            entity: Entity::Campaign,
            fields: &[
                "campaign.id",
                "segments.date",
                "segments.conversion_action_name",
                "metrics.conversions",
            ],
            window: Some(window),
            channel: Some(ChannelFilter::Only(ChannelType::PerformanceMax)),
            predicates: &[],
        }
    }

    /// Per-country performance per campaign and date.
    pub fn geographic(window: DateWindow) -> Self {
        AdsQuery {
            entity: Entity::GeographicView,
            fields: &[
                "campaign.id",
                "campaign.name",
                "segments.date",
                "geographic_view.country_criterion_id",
                "metrics.impressions",
                "metrics.clicks",
                "metrics.cost_micros",
                "metrics.conversions",
            ],
            window: Some(window),
            channel: None,
            predicates: &[],
        }
    }

    /// Search-term performance per campaign, ad group, date and device.
    pub fn search_terms(window: DateWindow) -> Self {
        AdsQuery {
            entity: Entity::SearchTermView,
            fields: &[
                "segments.date",
                "campaign.id",
                "campaign.name",
                "ad_group.id",
                "ad_group.name",
                "search_term_view.search_term",
                "segments.device",
                "metrics.impressions",
                "metrics.clicks",
                "metrics.cost_micros",
                "metrics.conversions",
            ],
            window: Some(window),
            channel: None,
            predicates: &[],
        }
    }

    pub fn to_gaql(&self) -> String {
        let mut query = format!(
            "SELECT {} FROM {}",
            self.fields.join(", "),
            self.entity.as_str()
        );

        let mut clauses: Vec<String> = Vec::new();
        if let Some(window) = &self.window {
            clauses.push(format!(
                "segments.date BETWEEN '{}' AND '{}'",
                window.start.format("%Y-%m-%d"),
                window.end.format("%Y-%m-%d")
            ));
        }
        match &self.channel {
            Some(ChannelFilter::Only(channel)) => clauses.push(format!(
                "campaign.advertising_channel_type = '{}'",
                channel.as_str()
            )),
            Some(ChannelFilter::Excluding(channel)) => clauses.push(format!(
                "campaign.advertising_channel_type != '{}'",
                channel.as_str()
            )),
            None => {}
        }
        for predicate in self.predicates {
            clauses.push((*predicate).to_string());
        }

        if !clauses.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&clauses.join(" AND "));
        }

        query
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    Unspecified,
    Enabled,
    Paused,
    Removed,
    #[serde(other)]
    Unknown,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Unspecified => "UNSPECIFIED",
            CampaignStatus::Enabled => "ENABLED",
            CampaignStatus::Paused => "PAUSED",
            CampaignStatus::Removed => "REMOVED",
            CampaignStatus::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Device {
    Unspecified,
    Mobile,
    Desktop,
    Tablet,
    ConnectedTv,
    Other,
    #[serde(other)]
    Unknown,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Unspecified => "UNSPECIFIED",
            Device::Mobile => "MOBILE",
            Device::Desktop => "DESKTOP",
            Device::Tablet => "TABLET",
            Device::ConnectedTv => "CONNECTED_TV",
            Device::Other => "OTHER",
            Device::Unknown => "UNKNOWN",
        }
    }
}

/// One result row of a search query. Only the attributes selected by the
/// query are populated; everything else stays `None`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportRow {
    pub customer_client: Option<CustomerClient>,
    pub campaign: Option<Campaign>,
    pub campaign_budget: Option<CampaignBudget>,
    pub ad_group: Option<AdGroup>,
    pub segments: Option<Segments>,
    pub metrics: Option<Metrics>,
    pub geographic_view: Option<GeographicView>,
    pub search_term_view: Option<SearchTermView>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomerClient {
    pub client_customer: Option<String>,
    pub descriptive_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Campaign {
    pub id: Option<String>,
    pub name: Option<String>,
    pub status: Option<CampaignStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CampaignBudget {
    pub amount_micros: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdGroup {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Segments {
    pub date: Option<String>,
    pub conversion_action_name: Option<String>,
    pub device: Option<Device>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Metrics {
    pub clicks: Option<u64>,
    pub impressions: Option<u64>,
    pub cost_micros: Option<i64>,
    pub conversions: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeographicView {
    pub country_criterion_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchTermView {
    pub search_term: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SearchResponse {
    results: Vec<ReportRow>,
    next_page_token: Option<String>,
}

#[async_trait::async_trait]
pub trait AdsApi: Send + Sync + 'static {
    /// Lists the active, non-manager child accounts of a manager account.
    ///
    /// The source may report the same account more than once; duplicates are
    /// collapsed by id, the last-seen name wins, and first-discovery order is
    /// preserved. Any source error is returned to the caller — discovery is
    /// a prerequisite for the whole run.
    async fn list_child_accounts(&self, manager_id: &str) -> Result<Vec<Account>, Error>;

    /// Runs one query against one account, following result pages until the
    /// source is exhausted.
    async fn search(&self, customer_id: &str, query: AdsQuery) -> Result<Vec<ReportRow>, Error>;
}

#[derive(Clone)]
pub struct AdsApiClient {
    client: Client,
    endpoint: String,
    developer_token: String,
    access_token: String,
    login_customer_id: String,
}

impl AdsApiClient {
    pub fn new(config: &ApiConfig) -> Self {
        AdsApiClient {
            client: Client::new(),
            endpoint: config.endpoint.clone(),
            developer_token: config.developer_token.clone(),
            access_token: config.access_token.clone(),
            login_customer_id: config.login_customer_id.clone().unwrap_or_default(),
        }
    }

    fn search_url(&self, customer_id: &str) -> Result<Url, Error> {
        let mut url = Url::parse(&self.endpoint)?;
        url.path_segments_mut()
            .map_err(|_| Error::UrlParsingFailed(url::ParseError::SetHostOnCannotBeABaseUrl))?
            .extend(&["customers", customer_id, "googleAds:search"]);
        Ok(url)
    }

    async fn search_page(
        &self,
        customer_id: &str,
        gaql: &str,
        page_token: Option<&str>,
    ) -> Result<SearchResponse, Error> {
        let mut body = serde_json::json!({ "query": gaql });
        if let Some(token) = page_token {
            body["pageToken"] = serde_json::Value::String(token.to_string());
        }

        let resp = self
            .client
            .post(self.search_url(customer_id)?)
            .bearer_auth(&self.access_token)
            .header("developer-token", &self.developer_token)
            .header("login-customer-id", &self.login_customer_id)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_else(|_| status.to_string());
            return Err(Error::Source {
                kind: classify_status(status),
                customer_id: customer_id.to_string(),
                message,
            });
        }

        Ok(resp.json::<SearchResponse>().await?)
    }
}

#[async_trait::async_trait]
impl AdsApi for AdsApiClient {
    async fn list_child_accounts(&self, manager_id: &str) -> Result<Vec<Account>, Error> {
        let rows = self.search(manager_id, AdsQuery::child_accounts()).await?;

        let pairs = rows.into_iter().filter_map(|row| {
            let client = row.customer_client?;
            let resource = client.client_customer?;
            // "customers/1234567890" → "1234567890"
            let id = resource.rsplit('/').next().unwrap_or(&resource).to_string();
            Some((id, client.descriptive_name.unwrap_or_default()))
        });

        Ok(dedupe_accounts(pairs))
    }

    async fn search(&self, customer_id: &str, query: AdsQuery) -> Result<Vec<ReportRow>, Error> {
        let gaql = query.to_gaql();
        let mut rows = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .search_page(customer_id, &gaql, page_token.as_deref())
                .await?;
            rows.extend(page.results);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(rows)
    }
}

/// Collapses duplicate account ids. The last-seen name wins; the output keeps
/// the order in which ids were first discovered.
fn dedupe_accounts(pairs: impl IntoIterator<Item = (String, String)>) -> Vec<Account> {
    let mut order: Vec<String> = Vec::new();
    let mut names: HashMap<String, String> = HashMap::new();

    for (id, name) in pairs {
        if !names.contains_key(&id) {
            order.push(id.clone());
        }
        names.insert(id, name);
    }

    order
        .into_iter()
        .map(|id| {
            let name = names.remove(&id).unwrap_or_default();
            Account { id, name }
        })
        .collect()
}

fn classify_status(status: StatusCode) -> SourceErrorKind {
    match status {
        StatusCode::BAD_REQUEST => SourceErrorKind::Query,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SourceErrorKind::Auth,
        StatusCode::TOO_MANY_REQUESTS => SourceErrorKind::RateLimit,
        _ => SourceErrorKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> DateWindow {
        DateWindow {
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
        }
    }

    fn test_config() -> ApiConfig {
        ApiConfig {
            endpoint: "https://ads.example.com/v19".to_string(),
            developer_token: "dev".to_string(),
            access_token: "token".to_string(),
            login_customer_id: None,
        }
    }

    #[test]
    fn trailing_window_excludes_current_day() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let window = DateWindow::trailing_90_days(today);
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2024, 3, 17).unwrap());
        assert_eq!(window.end, NaiveDate::from_ymd_opt(2024, 6, 14).unwrap());
    }

    #[test]
    fn gaql_for_standard_metrics_excludes_pmax() {
        let gaql = AdsQuery::ad_group_metrics(window()).to_gaql();
        assert!(gaql.starts_with("SELECT campaign.id, campaign.name"));
        assert!(gaql.contains("FROM ad_group"));
        assert!(gaql.contains("segments.date BETWEEN '2024-01-01' AND '2024-03-31'"));
        assert!(gaql.contains("campaign.advertising_channel_type != 'PERFORMANCE_MAX'"));
    }

    #[test]
    fn gaql_for_pmax_metrics_selects_only_pmax() {
        let gaql = AdsQuery::campaign_metrics(window()).to_gaql();
        assert!(gaql.contains("FROM campaign"));
        assert!(gaql.contains("campaign_budget.amount_micros"));
        assert!(gaql.contains("campaign.advertising_channel_type = 'PERFORMANCE_MAX'"));
        assert!(!gaql.contains("ad_group"));
    }

    #[test]
    fn gaql_for_budgets_has_no_window() {
        let gaql = AdsQuery::campaign_budgets().to_gaql();
        assert_eq!(
            gaql,
            "SELECT campaign.id, campaign_budget.amount_micros FROM campaign \
             WHERE campaign.status != 'REMOVED'"
        );
    }

    #[test]
    fn gaql_for_discovery_filters_active_non_managers() {
        let gaql = AdsQuery::child_accounts().to_gaql();
        assert!(gaql.contains("FROM customer_client"));
        assert!(gaql.contains("customer_client.status = 'ENABLED'"));
        assert!(gaql.contains("customer_client.manager = FALSE"));
    }

    #[test]
    fn dedupe_keeps_discovery_order_and_last_name() {
        let accounts = dedupe_accounts(vec![
            ("1".to_string(), "First".to_string()),
            ("2".to_string(), "Second".to_string()),
            ("1".to_string(), "First Renamed".to_string()),
        ]);

        assert_eq!(
            accounts,
            vec![
                Account {
                    id: "1".to_string(),
                    name: "First Renamed".to_string()
                },
                Account {
                    id: "2".to_string(),
                    name: "Second".to_string()
                },
            ]
        );
    }

    #[test]
    fn status_classification_covers_the_taxonomy() {
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST),
            SourceErrorKind::Query
        );
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED),
            SourceErrorKind::Auth
        );
        assert_eq!(classify_status(StatusCode::FORBIDDEN), SourceErrorKind::Auth);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            SourceErrorKind::RateLimit
        );
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            SourceErrorKind::Unknown
        );
    }

    #[test]
    fn report_row_deserializes_camel_case_fields() {
        let row: ReportRow = serde_json::from_value(serde_json::json!({
            "campaign": { "id": "42", "name": "Brand", "status": "ENABLED" },
            "segments": { "date": "2024-01-05", "device": "CONNECTED_TV" },
            "metrics": { "clicks": 10, "impressions": 100, "costMicros": 2500000, "conversions": 1.5 }
        }))
        .unwrap();

        let campaign = row.campaign.unwrap();
        assert_eq!(campaign.id.as_deref(), Some("42"));
        assert_eq!(campaign.status, Some(CampaignStatus::Enabled));
        let segments = row.segments.unwrap();
        assert_eq!(segments.device, Some(Device::ConnectedTv));
        let metrics = row.metrics.unwrap();
        assert_eq!(metrics.cost_micros, Some(2_500_000));
        assert_eq!(metrics.conversions, Some(1.5));
    }

    #[tokio::test]
    async fn search_with_invalid_endpoint_fails_with_url_error() {
        let mut config = test_config();
        config.endpoint = "invalid_url".to_string();
        let client = AdsApiClient::new(&config);

        let result = client
            .search("222", AdsQuery::campaign_budgets())
            .await;
        assert!(matches!(result.unwrap_err(), Error::UrlParsingFailed(_)));
    }
}
