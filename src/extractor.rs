use crate::api_client::{Account, AdsApi, AdsQuery, DateWindow, ReportRow};
use crate::data::{
    self, CampaignMetricRow, ConversionRow, GeoRow, RecordSet, SearchTermRow,
};
use crate::error::Error;
use datafusion::prelude::{DataFrame, SessionContext};
use log::warn;
use std::collections::HashMap;

const PMAX_AD_GROUP_ID: &str = "0";
const PMAX_AD_GROUP_NAME: &str = "Performance Max";

const STANDARD_JOIN_KEYS: &[&str] = &["campaign_id", "ad_group_id", "date"];
const PMAX_JOIN_KEYS: &[&str] = &["campaign_id", "date"];

/// Everything extracted for one account: one record set per logical table.
#[derive(Debug)]
pub struct AccountReport {
    pub account: Account,
    pub campaign: RecordSet,
    pub geography: RecordSet,
    pub search_terms: RecordSet,
}

/// Extracts the campaign, geography and search-term record sets for one
/// account. Source errors degrade the affected sub-task to an empty result;
/// any other error aborts this account only.
pub async fn extract_account(
    api: &dyn AdsApi,
    account: &Account,
    window: DateWindow,
) -> Result<AccountReport, Error> {
    let ctx = SessionContext::new();

    let mut campaign_batches = Vec::new();
    if let Some(frame) = standard_campaign_frame(api, &ctx, account, window).await? {
        campaign_batches.extend(frame.collect().await?);
    }
    if let Some(frame) = pmax_campaign_frame(api, &ctx, account, window).await? {
        campaign_batches.extend(frame.collect().await?);
    }
    let campaign = RecordSet::from_batches(data::campaign_schema(), campaign_batches);

    let geography = geography_records(api, account, window).await?;
    let search_terms = search_term_records(api, account, window).await?;

    Ok(AccountReport {
        account: account.clone(),
        campaign,
        geography,
        search_terms,
    })
}

/// Runs one query, degrading a source-side failure to `None` so the caller
/// can empty out the sub-task without aborting the account.
async fn run_query(
    api: &dyn AdsApi,
    account: &Account,
    query: AdsQuery,
    context: &str,
) -> Result<Option<Vec<ReportRow>>, Error> {
    match api.search(&account.id, query).await {
        Ok(rows) => Ok(Some(rows)),
        Err(err) if err.is_source() => {
            warn!(
                "{context} query failed for account {} ({}): {err}",
                account.name, account.id
            );
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Standard campaigns: budgets looked up per campaign, ad-group metrics
/// outer-joined with per-action conversions.
async fn standard_campaign_frame(
    api: &dyn AdsApi,
    ctx: &SessionContext,
    account: &Account,
    window: DateWindow,
) -> Result<Option<DataFrame>, Error> {
    // Secondary lookup; a failure here only costs the budget column.
    let budgets = match run_query(api, account, AdsQuery::campaign_budgets(), "campaign budgets")
        .await?
    {
        Some(rows) => budgets_by_campaign(&rows),
        None => HashMap::new(),
    };

    let Some(metric_rows) = run_query(
        api,
        account,
        AdsQuery::ad_group_metrics(window),
        "standard campaign metrics",
    )
    .await?
    else {
        return Ok(None);
    };
    let Some(conversion_rows) = run_query(
        api,
        account,
        AdsQuery::ad_group_conversions(window),
        "standard campaign conversions",
    )
    .await?
    else {
        return Ok(None);
    };

    let metrics = standard_metric_rows(account, &budgets, &metric_rows);
    let conversions = standard_conversion_rows(&conversion_rows);
    if metrics.is_empty() && conversions.is_empty() {
        return Ok(None);
    }

    let frame = data::outer_join_zero_fill(
        ctx,
        data::campaign_metrics_batch(&metrics)?,
        data::conversions_batch(&conversions, true)?,
        STANDARD_JOIN_KEYS,
        data::orphan_conversion_columns(&account.name, &account.id, None),
    )?;
    Ok(Some(frame))
}

/// Performance Max campaigns have no ad groups: metrics come at campaign
/// level with the budget inline, and a placeholder ad group is substituted.
async fn pmax_campaign_frame(
    api: &dyn AdsApi,
    ctx: &SessionContext,
    account: &Account,
    window: DateWindow,
) -> Result<Option<DataFrame>, Error> {
    let Some(metric_rows) = run_query(
        api,
        account,
        AdsQuery::campaign_metrics(window),
        "Performance Max metrics",
    )
    .await?
    else {
        return Ok(None);
    };
    let Some(conversion_rows) = run_query(
        api,
        account,
        AdsQuery::campaign_conversions(window),
        "Performance Max conversions",
    )
    .await?
    else {
        return Ok(None);
    };

    let metrics = pmax_metric_rows(account, &metric_rows);
    let conversions = pmax_conversion_rows(&conversion_rows);
    if metrics.is_empty() && conversions.is_empty() {
        return Ok(None);
    }

    let frame = data::outer_join_zero_fill(
        ctx,
        data::campaign_metrics_batch(&metrics)?,
        data::conversions_batch(&conversions, false)?,
        PMAX_JOIN_KEYS,
        data::orphan_conversion_columns(
            &account.name,
            &account.id,
            Some((PMAX_AD_GROUP_ID, PMAX_AD_GROUP_NAME)),
        ),
    )?;
    Ok(Some(frame))
}

async fn geography_records(
    api: &dyn AdsApi,
    account: &Account,
    window: DateWindow,
) -> Result<RecordSet, Error> {
    let Some(rows) = run_query(api, account, AdsQuery::geographic(window), "geography").await?
    else {
        return Ok(RecordSet::empty(data::geography_schema()));
    };

    let geo_rows: Vec<GeoRow> = rows
        .iter()
        .map(|row| {
            let campaign = row.campaign.clone().unwrap_or_default();
            let segments = row.segments.clone().unwrap_or_default();
            let metrics = row.metrics.clone().unwrap_or_default();
            GeoRow {
                account_name: account.name.clone(),
                customer_id: account.id.clone(),
                campaign_id: campaign.id.unwrap_or_default(),
                campaign_name: campaign.name.unwrap_or_default(),
                date: segments.date.unwrap_or_default(),
                country_criterion_id: row
                    .geographic_view
                    .as_ref()
                    .and_then(|view| view.country_criterion_id)
                    .unwrap_or(0),
                impressions: metrics.impressions.unwrap_or(0),
                clicks: metrics.clicks.unwrap_or(0),
                cost: data::micros_to_currency(metrics.cost_micros.unwrap_or(0)),
                conversions: metrics.conversions.unwrap_or(0.0),
            }
        })
        .collect();

    Ok(RecordSet::from_batches(
        data::geography_schema(),
        vec![data::geo_batch(&geo_rows)?],
    ))
}

async fn search_term_records(
    api: &dyn AdsApi,
    account: &Account,
    window: DateWindow,
) -> Result<RecordSet, Error> {
    let Some(rows) = run_query(api, account, AdsQuery::search_terms(window), "search terms").await?
    else {
        return Ok(RecordSet::empty(data::search_terms_schema()));
    };

    let term_rows: Vec<SearchTermRow> = rows
        .iter()
        .map(|row| {
            let campaign = row.campaign.clone().unwrap_or_default();
            let ad_group = row.ad_group.clone().unwrap_or_default();
            let segments = row.segments.clone().unwrap_or_default();
            let metrics = row.metrics.clone().unwrap_or_default();
            SearchTermRow {
                account_name: account.name.clone(),
                customer_id: account.id.clone(),
                date: segments.date.unwrap_or_default(),
                campaign_id: campaign.id.unwrap_or_default(),
                campaign_name: campaign.name.unwrap_or_default(),
                ad_group_id: ad_group.id.unwrap_or_default(),
                ad_group_name: ad_group.name.unwrap_or_default(),
                search_term: row
                    .search_term_view
                    .as_ref()
                    .and_then(|view| view.search_term.clone())
                    .unwrap_or_default(),
                device: segments
                    .device
                    .map(|device| device.as_str().to_string())
                    .unwrap_or_else(|| "UNKNOWN".to_string()),
                impressions: metrics.impressions.unwrap_or(0),
                clicks: metrics.clicks.unwrap_or(0),
                cost: data::micros_to_currency(metrics.cost_micros.unwrap_or(0)),
                conversions: metrics.conversions.unwrap_or(0.0),
            }
        })
        .collect();

    Ok(RecordSet::from_batches(
        data::search_terms_schema(),
        vec![data::search_terms_batch(&term_rows)?],
    ))
}

fn budgets_by_campaign(rows: &[ReportRow]) -> HashMap<String, f64> {
    rows.iter()
        .filter_map(|row| {
            let id = row.campaign.as_ref()?.id.clone()?;
            let micros = row
                .campaign_budget
                .as_ref()
                .and_then(|budget| budget.amount_micros)
                .unwrap_or(0);
            Some((id, data::micros_to_currency(micros)))
        })
        .collect()
}

fn standard_metric_rows(
    account: &Account,
    budgets: &HashMap<String, f64>,
    rows: &[ReportRow],
) -> Vec<CampaignMetricRow> {
    rows.iter()
        .map(|row| {
            let campaign = row.campaign.clone().unwrap_or_default();
            let ad_group = row.ad_group.clone().unwrap_or_default();
            let segments = row.segments.clone().unwrap_or_default();
            let metrics = row.metrics.clone().unwrap_or_default();
            let campaign_id = campaign.id.unwrap_or_default();
            let daily_budget = budgets.get(&campaign_id).copied().unwrap_or(0.0);
            CampaignMetricRow {
                account_name: account.name.clone(),
                customer_id: account.id.clone(),
                campaign_id,
                campaign_name: campaign.name.unwrap_or_default(),
                campaign_status: campaign
                    .status
                    .map(|status| status.as_str().to_string())
                    .unwrap_or_else(|| "UNKNOWN".to_string()),
                daily_budget,
                ad_group_id: ad_group.id.unwrap_or_default(),
                ad_group_name: ad_group.name.unwrap_or_default(),
                date: segments.date.unwrap_or_default(),
                clicks: metrics.clicks.unwrap_or(0),
                impressions: metrics.impressions.unwrap_or(0),
                cost: data::micros_to_currency(metrics.cost_micros.unwrap_or(0)),
            }
        })
        .collect()
}

fn pmax_metric_rows(account: &Account, rows: &[ReportRow]) -> Vec<CampaignMetricRow> {
    rows.iter()
        .map(|row| {
            let campaign = row.campaign.clone().unwrap_or_default();
            let segments = row.segments.clone().unwrap_or_default();
            let metrics = row.metrics.clone().unwrap_or_default();
            CampaignMetricRow {
                account_name: account.name.clone(),
                customer_id: account.id.clone(),
                campaign_id: campaign.id.unwrap_or_default(),
                campaign_name: campaign.name.unwrap_or_default(),
                campaign_status: campaign
                    .status
                    .map(|status| status.as_str().to_string())
                    .unwrap_or_else(|| "UNKNOWN".to_string()),
                daily_budget: data::micros_to_currency(
                    row.campaign_budget
                        .as_ref()
                        .and_then(|budget| budget.amount_micros)
                        .unwrap_or(0),
                ),
                ad_group_id: PMAX_AD_GROUP_ID.to_string(),
                ad_group_name: PMAX_AD_GROUP_NAME.to_string(),
                date: segments.date.unwrap_or_default(),
                clicks: metrics.clicks.unwrap_or(0),
                impressions: metrics.impressions.unwrap_or(0),
                cost: data::micros_to_currency(metrics.cost_micros.unwrap_or(0)),
            }
        })
        .collect()
}

fn standard_conversion_rows(rows: &[ReportRow]) -> Vec<ConversionRow> {
    rows.iter()
        .map(|row| {
            let segments = row.segments.clone().unwrap_or_default();
            ConversionRow {
                campaign_id: row
                    .campaign
                    .as_ref()
                    .and_then(|campaign| campaign.id.clone())
                    .unwrap_or_default(),
                ad_group_id: Some(
                    row.ad_group
                        .as_ref()
                        .and_then(|ad_group| ad_group.id.clone())
                        .unwrap_or_default(),
                ),
                date: segments.date.unwrap_or_default(),
                conversion_name: segments.conversion_action_name.unwrap_or_default(),
                conversions: row
                    .metrics
                    .as_ref()
                    .and_then(|metrics| metrics.conversions)
                    .unwrap_or(0.0),
            }
        })
        .collect()
}

fn pmax_conversion_rows(rows: &[ReportRow]) -> Vec<ConversionRow> {
    rows.iter()
        .map(|row| {
            let segments = row.segments.clone().unwrap_or_default();
            ConversionRow {
                campaign_id: row
                    .campaign
                    .as_ref()
                    .and_then(|campaign| campaign.id.clone())
                    .unwrap_or_default(),
                ad_group_id: None,
                date: segments.date.unwrap_or_default(),
                conversion_name: segments.conversion_action_name.unwrap_or_default(),
                conversions: row
                    .metrics
                    .as_ref()
                    .and_then(|metrics| metrics.conversions)
                    .unwrap_or(0.0),
            }
        })
        .collect()
}
