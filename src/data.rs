use crate::error::Error;
use datafusion::arrow::array::{
    Float64Builder, Int64Builder, RecordBatch, StringBuilder, UInt64Builder,
};
use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use datafusion::common::{JoinType, ScalarValue};
use datafusion::logical_expr::Expr;
use datafusion::prelude::{col, lit, DataFrame, SessionContext};
use std::sync::Arc;

/// Canonical column order of the campaign table. Batch builders and join
/// projections must both produce exactly this layout.
pub const CAMPAIGN_COLUMNS: &[&str] = &[
    "account_name",
    "customer_id",
    "campaign_id",
    "campaign_name",
    "campaign_status",
    "daily_budget",
    "ad_group_id",
    "ad_group_name",
    "date",
    "clicks",
    "impressions",
    "cost",
    "conversion_name",
    "conversions",
];

pub fn campaign_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("account_name", DataType::Utf8, false),
        Field::new("customer_id", DataType::Utf8, false),
        Field::new("campaign_id", DataType::Utf8, false),
        Field::new("campaign_name", DataType::Utf8, true),
        Field::new("campaign_status", DataType::Utf8, false),
        Field::new("daily_budget", DataType::Float64, false),
        Field::new("ad_group_id", DataType::Utf8, false),
        Field::new("ad_group_name", DataType::Utf8, true),
        Field::new("date", DataType::Utf8, false),
        Field::new("clicks", DataType::UInt64, false),
        Field::new("impressions", DataType::UInt64, false),
        Field::new("cost", DataType::Float64, false),
        Field::new("conversion_name", DataType::Utf8, true),
        Field::new("conversions", DataType::Float64, false),
    ]))
}

pub fn geography_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("account_name", DataType::Utf8, false),
        Field::new("customer_id", DataType::Utf8, false),
        Field::new("campaign_id", DataType::Utf8, false),
        Field::new("campaign_name", DataType::Utf8, false),
        Field::new("date", DataType::Utf8, false),
        Field::new("country_criterion_id", DataType::Int64, false),
        Field::new("impressions", DataType::UInt64, false),
        Field::new("clicks", DataType::UInt64, false),
        Field::new("cost", DataType::Float64, false),
        Field::new("conversions", DataType::Float64, false),
    ]))
}

pub fn search_terms_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("account_name", DataType::Utf8, false),
        Field::new("customer_id", DataType::Utf8, false),
        Field::new("date", DataType::Utf8, false),
        Field::new("campaign_id", DataType::Utf8, false),
        Field::new("campaign_name", DataType::Utf8, false),
        Field::new("ad_group_id", DataType::Utf8, false),
        Field::new("ad_group_name", DataType::Utf8, false),
        Field::new("search_term", DataType::Utf8, false),
        Field::new("device", DataType::Utf8, false),
        Field::new("impressions", DataType::UInt64, false),
        Field::new("clicks", DataType::UInt64, false),
        Field::new("cost", DataType::Float64, false),
        Field::new("conversions", DataType::Float64, false),
    ]))
}

/// Converts a micro-currency amount into a standard currency amount.
pub fn micros_to_currency(micros: i64) -> f64 {
    micros as f64 / 1_000_000.0
}

/// An immutable, fully materialized result destined for exactly one logical
/// table. Produced once by an extractor invocation and consumed exactly once
/// by the sink writer.
#[derive(Debug, Clone)]
pub struct RecordSet {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl RecordSet {
    pub fn empty(schema: SchemaRef) -> Self {
        RecordSet {
            schema,
            batches: Vec::new(),
        }
    }

    /// Wraps collected batches under the canonical schema, dropping batches
    /// with no rows.
    pub fn from_batches(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        let batches = batches.into_iter().filter(|b| b.num_rows() > 0).collect();
        RecordSet { schema, batches }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Serializes every row into a JSON object, the payload shape the
    /// warehouse insert endpoint accepts. Null values are omitted.
    pub fn json_rows(&self) -> Result<Vec<serde_json::Map<String, serde_json::Value>>, Error> {
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let mut writer = arrow::json::ArrayWriter::new(Vec::new());
        let refs: Vec<&RecordBatch> = self.batches.iter().collect();
        writer.write_batches(&refs)?;
        writer.finish()?;

        Ok(serde_json::from_slice(&writer.into_inner())?)
    }
}

/// One metrics row of the campaign table before conversions are joined in.
#[derive(Debug, Clone)]
pub struct CampaignMetricRow {
    pub account_name: String,
    pub customer_id: String,
    pub campaign_id: String,
    pub campaign_name: String,
    pub campaign_status: String,
    pub daily_budget: f64,
    pub ad_group_id: String,
    pub ad_group_name: String,
    pub date: String,
    pub clicks: u64,
    pub impressions: u64,
    pub cost: f64,
}

/// One conversions row, segmented by conversion action. `ad_group_id` is
/// absent for campaign types without the ad-group subdivision.
#[derive(Debug, Clone)]
pub struct ConversionRow {
    pub campaign_id: String,
    pub ad_group_id: Option<String>,
    pub date: String,
    pub conversion_name: String,
    pub conversions: f64,
}

#[derive(Debug, Clone)]
pub struct GeoRow {
    pub account_name: String,
    pub customer_id: String,
    pub campaign_id: String,
    pub campaign_name: String,
    pub date: String,
    pub country_criterion_id: i64,
    pub impressions: u64,
    pub clicks: u64,
    pub cost: f64,
    pub conversions: f64,
}

#[derive(Debug, Clone)]
pub struct SearchTermRow {
    pub account_name: String,
    pub customer_id: String,
    pub date: String,
    pub campaign_id: String,
    pub campaign_name: String,
    pub ad_group_id: String,
    pub ad_group_name: String,
    pub search_term: String,
    pub device: String,
    pub impressions: u64,
    pub clicks: u64,
    pub cost: f64,
    pub conversions: f64,
}

fn metrics_side_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("account_name", DataType::Utf8, false),
        Field::new("customer_id", DataType::Utf8, false),
        Field::new("campaign_id", DataType::Utf8, false),
        Field::new("campaign_name", DataType::Utf8, true),
        Field::new("campaign_status", DataType::Utf8, false),
        Field::new("daily_budget", DataType::Float64, false),
        Field::new("ad_group_id", DataType::Utf8, false),
        Field::new("ad_group_name", DataType::Utf8, true),
        Field::new("date", DataType::Utf8, false),
        Field::new("clicks", DataType::UInt64, false),
        Field::new("impressions", DataType::UInt64, false),
        Field::new("cost", DataType::Float64, false),
    ]))
}

pub fn campaign_metrics_batch(rows: &[CampaignMetricRow]) -> Result<RecordBatch, Error> {
    let schema = metrics_side_schema();
    if rows.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }

    let mut account_name = StringBuilder::new();
    let mut customer_id = StringBuilder::new();
    let mut campaign_id = StringBuilder::new();
    let mut campaign_name = StringBuilder::new();
    let mut campaign_status = StringBuilder::new();
    let mut daily_budget = Float64Builder::with_capacity(rows.len());
    let mut ad_group_id = StringBuilder::new();
    let mut ad_group_name = StringBuilder::new();
    let mut date = StringBuilder::new();
    let mut clicks = UInt64Builder::with_capacity(rows.len());
    let mut impressions = UInt64Builder::with_capacity(rows.len());
    let mut cost = Float64Builder::with_capacity(rows.len());

    for row in rows {
        account_name.append_value(&row.account_name);
        customer_id.append_value(&row.customer_id);
        campaign_id.append_value(&row.campaign_id);
        campaign_name.append_value(&row.campaign_name);
        campaign_status.append_value(&row.campaign_status);
        daily_budget.append_value(row.daily_budget);
        ad_group_id.append_value(&row.ad_group_id);
        ad_group_name.append_value(&row.ad_group_name);
        date.append_value(&row.date);
        clicks.append_value(row.clicks);
        impressions.append_value(row.impressions);
        cost.append_value(row.cost);
    }

    Ok(RecordBatch::try_new(
        schema,
        vec![
            Arc::new(account_name.finish()),
            Arc::new(customer_id.finish()),
            Arc::new(campaign_id.finish()),
            Arc::new(campaign_name.finish()),
            Arc::new(campaign_status.finish()),
            Arc::new(daily_budget.finish()),
            Arc::new(ad_group_id.finish()),
            Arc::new(ad_group_name.finish()),
            Arc::new(date.finish()),
            Arc::new(clicks.finish()),
            Arc::new(impressions.finish()),
            Arc::new(cost.finish()),
        ],
    )?)
}

/// Builds the conversions side of the join. `with_ad_group` controls whether
/// the ad-group key column is part of the batch.
pub fn conversions_batch(rows: &[ConversionRow], with_ad_group: bool) -> Result<RecordBatch, Error> {
    let mut fields = vec![Field::new("campaign_id", DataType::Utf8, false)];
    if with_ad_group {
        fields.push(Field::new("ad_group_id", DataType::Utf8, false));
    }
    fields.push(Field::new("date", DataType::Utf8, false));
    fields.push(Field::new("conversion_name", DataType::Utf8, false));
    fields.push(Field::new("conversions", DataType::Float64, false));
    let schema = Arc::new(Schema::new(fields));

    if rows.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }

    let mut campaign_id = StringBuilder::new();
    let mut ad_group_id = StringBuilder::new();
    let mut date = StringBuilder::new();
    let mut conversion_name = StringBuilder::new();
    let mut conversions = Float64Builder::with_capacity(rows.len());

    for row in rows {
        campaign_id.append_value(&row.campaign_id);
        if with_ad_group {
            ad_group_id.append_value(row.ad_group_id.as_deref().unwrap_or_default());
        }
        date.append_value(&row.date);
        conversion_name.append_value(&row.conversion_name);
        conversions.append_value(row.conversions);
    }

    let mut columns: Vec<datafusion::arrow::array::ArrayRef> =
        vec![Arc::new(campaign_id.finish())];
    if with_ad_group {
        columns.push(Arc::new(ad_group_id.finish()));
    }
    columns.push(Arc::new(date.finish()));
    columns.push(Arc::new(conversion_name.finish()));
    columns.push(Arc::new(conversions.finish()));

    Ok(RecordBatch::try_new(schema, columns)?)
}

pub fn geo_batch(rows: &[GeoRow]) -> Result<RecordBatch, Error> {
    let schema = geography_schema();
    if rows.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }

    let mut account_name = StringBuilder::new();
    let mut customer_id = StringBuilder::new();
    let mut campaign_id = StringBuilder::new();
    let mut campaign_name = StringBuilder::new();
    let mut date = StringBuilder::new();
    let mut country = Int64Builder::with_capacity(rows.len());
    let mut impressions = UInt64Builder::with_capacity(rows.len());
    let mut clicks = UInt64Builder::with_capacity(rows.len());
    let mut cost = Float64Builder::with_capacity(rows.len());
    let mut conversions = Float64Builder::with_capacity(rows.len());

    for row in rows {
        account_name.append_value(&row.account_name);
        customer_id.append_value(&row.customer_id);
        campaign_id.append_value(&row.campaign_id);
        campaign_name.append_value(&row.campaign_name);
        date.append_value(&row.date);
        country.append_value(row.country_criterion_id);
        impressions.append_value(row.impressions);
        clicks.append_value(row.clicks);
        cost.append_value(row.cost);
        conversions.append_value(row.conversions);
    }

    Ok(RecordBatch::try_new(
        schema,
        vec![
            Arc::new(account_name.finish()),
            Arc::new(customer_id.finish()),
            Arc::new(campaign_id.finish()),
            Arc::new(campaign_name.finish()),
            Arc::new(date.finish()),
            Arc::new(country.finish()),
            Arc::new(impressions.finish()),
            Arc::new(clicks.finish()),
            Arc::new(cost.finish()),
            Arc::new(conversions.finish()),
        ],
    )?)
}

pub fn search_terms_batch(rows: &[SearchTermRow]) -> Result<RecordBatch, Error> {
    let schema = search_terms_schema();
    if rows.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }

    let mut account_name = StringBuilder::new();
    let mut customer_id = StringBuilder::new();
    let mut date = StringBuilder::new();
    let mut campaign_id = StringBuilder::new();
    let mut campaign_name = StringBuilder::new();
    let mut ad_group_id = StringBuilder::new();
    let mut ad_group_name = StringBuilder::new();
    let mut search_term = StringBuilder::new();
    let mut device = StringBuilder::new();
    let mut impressions = UInt64Builder::with_capacity(rows.len());
    let mut clicks = UInt64Builder::with_capacity(rows.len());
    let mut cost = Float64Builder::with_capacity(rows.len());
    let mut conversions = Float64Builder::with_capacity(rows.len());

    for row in rows {
        account_name.append_value(&row.account_name);
        customer_id.append_value(&row.customer_id);
        date.append_value(&row.date);
        campaign_id.append_value(&row.campaign_id);
        campaign_name.append_value(&row.campaign_name);
        ad_group_id.append_value(&row.ad_group_id);
        ad_group_name.append_value(&row.ad_group_name);
        search_term.append_value(&row.search_term);
        device.append_value(&row.device);
        impressions.append_value(row.impressions);
        clicks.append_value(row.clicks);
        cost.append_value(row.cost);
        conversions.append_value(row.conversions);
    }

    Ok(RecordBatch::try_new(
        schema,
        vec![
            Arc::new(account_name.finish()),
            Arc::new(customer_id.finish()),
            Arc::new(date.finish()),
            Arc::new(campaign_id.finish()),
            Arc::new(campaign_name.finish()),
            Arc::new(ad_group_id.finish()),
            Arc::new(ad_group_name.finish()),
            Arc::new(search_term.finish()),
            Arc::new(device.finish()),
            Arc::new(impressions.finish()),
            Arc::new(clicks.finish()),
            Arc::new(cost.finish()),
            Arc::new(conversions.finish()),
        ],
    )?)
}

/// The projection for conversion rows that matched no metrics row: account
/// columns are stamped from the extraction context, descriptive columns the
/// metrics side would have supplied stay null, status becomes UNKNOWN and
/// every measure the conversions side lacks is a typed zero.
///
/// `placeholder_ad_group` substitutes a synthetic ad group for campaign
/// types without the ad-group subdivision; `None` takes the ad-group key
/// from the conversion row itself.
pub fn orphan_conversion_columns(
    account_name: &str,
    customer_id: &str,
    placeholder_ad_group: Option<(&str, &str)>,
) -> Vec<Expr> {
    let (ad_group_id, ad_group_name) = match placeholder_ad_group {
        Some((id, name)) => (
            lit(id).alias("ad_group_id"),
            lit(name).alias("ad_group_name"),
        ),
        None => (
            col("ad_group_id"),
            lit(ScalarValue::Utf8(None)).alias("ad_group_name"),
        ),
    };

    vec![
        lit(account_name).alias("account_name"),
        lit(customer_id).alias("customer_id"),
        col("campaign_id"),
        lit(ScalarValue::Utf8(None)).alias("campaign_name"),
        lit("UNKNOWN").alias("campaign_status"),
        lit(0.0_f64).alias("daily_budget"),
        ad_group_id,
        ad_group_name,
        col("date"),
        lit(ScalarValue::UInt64(Some(0))).alias("clicks"),
        lit(ScalarValue::UInt64(Some(0))).alias("impressions"),
        lit(0.0_f64).alias("cost"),
        col("conversion_name"),
        col("conversions"),
    ]
}

/// Outer-joins a metrics batch with a conversions batch on `keys`, zero
/// filling measures missing from either side.
///
/// The result contains the union of keys from both inputs: metrics rows with
/// no conversions keep their measures and get zero conversions, each
/// conversion action matching a key produces its own row, and conversion
/// rows whose key never appeared in the metrics query survive with zeroed
/// metric measures (`orphan_select` supplies their full projection).
pub fn outer_join_zero_fill(
    ctx: &SessionContext,
    metrics: RecordBatch,
    conversions: RecordBatch,
    keys: &[&str],
    orphan_select: Vec<Expr>,
) -> Result<DataFrame, Error> {
    let metrics_df = ctx.read_batch(metrics)?;
    let conversions_df = ctx.read_batch(conversions)?;

    // Rename the conversion keys so the left join carries no duplicate names.
    let conv_keys: Vec<String> = keys.iter().map(|k| format!("conv_{k}")).collect();
    let conv_key_refs: Vec<&str> = conv_keys.iter().map(String::as_str).collect();
    let mut conv_select: Vec<Expr> = keys
        .iter()
        .zip(conv_keys.iter())
        .map(|(key, renamed)| col(*key).alias(renamed))
        .collect();
    conv_select.push(col("conversion_name"));
    conv_select.push(col("conversions"));
    let conversions_renamed = conversions_df.clone().select(conv_select)?;

    let matched = metrics_df
        .clone()
        .join(
            conversions_renamed,
            JoinType::Left,
            keys,
            &conv_key_refs,
            None,
        )?
        .drop_columns(&conv_key_refs)?
        .select(CAMPAIGN_COLUMNS.iter().map(|c| col(*c)).collect())?;

    // Conversion rows whose key has no metrics row.
    let metric_keys: Vec<String> = keys.iter().map(|k| format!("metric_{k}")).collect();
    let metric_key_refs: Vec<&str> = metric_keys.iter().map(String::as_str).collect();
    let metrics_keys_only = metrics_df.select(
        keys.iter()
            .zip(metric_keys.iter())
            .map(|(key, renamed)| col(*key).alias(renamed))
            .collect(),
    )?;
    let orphans = conversions_df
        .join(
            metrics_keys_only,
            JoinType::LeftAnti,
            keys,
            &metric_key_refs,
            None,
        )?
        .select(orphan_select)?;

    let df = matched.union(orphans)?.fill_null(
        ScalarValue::Float64(Some(0.0)),
        vec!["conversions".to_owned()],
    )?;

    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric_row(campaign: &str, ad_group: &str, date: &str, clicks: u64) -> CampaignMetricRow {
        CampaignMetricRow {
            account_name: "Acme".to_string(),
            customer_id: "111".to_string(),
            campaign_id: campaign.to_string(),
            campaign_name: format!("campaign {campaign}"),
            campaign_status: "ENABLED".to_string(),
            daily_budget: 25.0,
            ad_group_id: ad_group.to_string(),
            ad_group_name: format!("ad group {ad_group}"),
            date: date.to_string(),
            clicks,
            impressions: clicks * 10,
            cost: clicks as f64 * 0.5,
        }
    }

    fn conversion_row(
        campaign: &str,
        ad_group: Option<&str>,
        date: &str,
        name: &str,
        conversions: f64,
    ) -> ConversionRow {
        ConversionRow {
            campaign_id: campaign.to_string(),
            ad_group_id: ad_group.map(str::to_string),
            date: date.to_string(),
            conversion_name: name.to_string(),
            conversions,
        }
    }

    async fn joined_rows(
        metrics: Vec<CampaignMetricRow>,
        conversions: Vec<ConversionRow>,
    ) -> Vec<serde_json::Map<String, serde_json::Value>> {
        let ctx = SessionContext::new();
        let metrics = campaign_metrics_batch(&metrics).unwrap();
        let conversions = conversions_batch(&conversions, true).unwrap();
        let df = outer_join_zero_fill(
            &ctx,
            metrics,
            conversions,
            &["campaign_id", "ad_group_id", "date"],
            orphan_conversion_columns("Acme", "111", None),
        )
        .unwrap();
        let batches = df.collect().await.unwrap();
        RecordSet::from_batches(campaign_schema(), batches)
            .json_rows()
            .unwrap()
    }

    #[test]
    fn micros_conversion() {
        assert_eq!(micros_to_currency(2_500_000), 2.5);
        assert_eq!(micros_to_currency(0), 0.0);
    }

    #[test]
    fn empty_record_set_serializes_to_no_rows() {
        let records = RecordSet::empty(campaign_schema());
        assert!(records.is_empty());
        assert!(records.json_rows().unwrap().is_empty());
    }

    #[test]
    fn from_batches_drops_empty_batches() {
        let empty = campaign_metrics_batch(&[]).unwrap();
        let records = RecordSet::from_batches(campaign_schema(), vec![empty]);
        assert!(records.is_empty());
        assert!(records.batches.is_empty());
    }

    #[tokio::test]
    async fn join_result_is_union_of_keys_with_zero_fill() {
        let rows = joined_rows(
            vec![
                metric_row("c1", "g1", "2024-01-01", 5),
                metric_row("c2", "g2", "2024-01-01", 7),
            ],
            vec![
                conversion_row("c2", Some("g2"), "2024-01-01", "signup", 2.0),
                conversion_row("c3", Some("g3"), "2024-01-01", "signup", 1.0),
            ],
        )
        .await;

        assert_eq!(rows.len(), 3);

        let c1 = rows.iter().find(|r| r["campaign_id"] == "c1").unwrap();
        assert_eq!(c1["clicks"], serde_json::json!(5));
        assert_eq!(c1["conversions"], serde_json::json!(0.0));
        // null conversion_name is omitted rather than written as null
        assert!(!c1.contains_key("conversion_name"));

        let c2 = rows.iter().find(|r| r["campaign_id"] == "c2").unwrap();
        assert_eq!(c2["conversions"], serde_json::json!(2.0));
        assert_eq!(c2["conversion_name"], serde_json::json!("signup"));
    }

    #[tokio::test]
    async fn conversion_only_keys_survive_outer_join() {
        // A conversion reported on a date with no impression/click row must
        // not be dropped; it carries zeroed measures and UNKNOWN status.
        let rows = joined_rows(
            vec![metric_row("c1", "g1", "2024-01-01", 5)],
            vec![conversion_row("c9", Some("g9"), "2024-01-02", "purchase", 3.0)],
        )
        .await;

        assert_eq!(rows.len(), 2);
        let orphan = rows.iter().find(|r| r["campaign_id"] == "c9").unwrap();
        assert_eq!(orphan["clicks"], serde_json::json!(0));
        assert_eq!(orphan["impressions"], serde_json::json!(0));
        assert_eq!(orphan["cost"], serde_json::json!(0.0));
        assert_eq!(orphan["daily_budget"], serde_json::json!(0.0));
        assert_eq!(orphan["campaign_status"], serde_json::json!("UNKNOWN"));
        assert_eq!(orphan["account_name"], serde_json::json!("Acme"));
        assert_eq!(orphan["customer_id"], serde_json::json!("111"));
        assert_eq!(orphan["conversions"], serde_json::json!(3.0));
    }

    #[tokio::test]
    async fn one_key_with_several_conversion_actions_repeats_metrics() {
        let rows = joined_rows(
            vec![metric_row("c1", "g1", "2024-01-01", 5)],
            vec![
                conversion_row("c1", Some("g1"), "2024-01-01", "signup", 2.0),
                conversion_row("c1", Some("g1"), "2024-01-01", "purchase", 1.0),
            ],
        )
        .await;

        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row["clicks"], serde_json::json!(5));
        }
        let names: Vec<_> = rows.iter().map(|r| r["conversion_name"].clone()).collect();
        assert!(names.contains(&serde_json::json!("signup")));
        assert!(names.contains(&serde_json::json!("purchase")));
    }

    #[tokio::test]
    async fn empty_conversions_leaves_metrics_with_zero_conversions() {
        let rows = joined_rows(vec![metric_row("c1", "g1", "2024-01-01", 5)], vec![]).await;

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["conversions"], serde_json::json!(0.0));
    }

    #[tokio::test]
    async fn empty_metrics_keeps_all_conversion_rows() {
        let rows = joined_rows(
            vec![],
            vec![conversion_row("c1", Some("g1"), "2024-01-01", "signup", 2.0)],
        )
        .await;

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["clicks"], serde_json::json!(0));
        assert_eq!(rows[0]["conversions"], serde_json::json!(2.0));
    }

    #[tokio::test]
    async fn pmax_orphans_get_the_placeholder_ad_group() {
        let ctx = SessionContext::new();
        let metrics = campaign_metrics_batch(&[]).unwrap();
        let conversions = conversions_batch(
            &[conversion_row("c1", None, "2024-01-01", "signup", 2.0)],
            false,
        )
        .unwrap();
        let df = outer_join_zero_fill(
            &ctx,
            metrics,
            conversions,
            &["campaign_id", "date"],
            orphan_conversion_columns("Acme", "111", Some(("0", "Performance Max"))),
        )
        .unwrap();
        let rows = RecordSet::from_batches(campaign_schema(), df.collect().await.unwrap())
            .json_rows()
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["ad_group_id"], serde_json::json!("0"));
        assert_eq!(rows[0]["ad_group_name"], serde_json::json!("Performance Max"));
    }

    #[test]
    fn geo_batch_has_the_canonical_layout() {
        let batch = geo_batch(&[GeoRow {
            account_name: "Acme".to_string(),
            customer_id: "111".to_string(),
            campaign_id: "c1".to_string(),
            campaign_name: "campaign".to_string(),
            date: "2024-01-01".to_string(),
            country_criterion_id: 2840,
            impressions: 100,
            clicks: 10,
            cost: 1.5,
            conversions: 0.5,
        }])
        .unwrap();

        assert_eq!(batch.num_rows(), 1);
        assert_eq!(batch.schema(), geography_schema());
    }

    #[test]
    fn search_terms_batch_has_the_canonical_layout() {
        let batch = search_terms_batch(&[SearchTermRow {
            account_name: "Acme".to_string(),
            customer_id: "111".to_string(),
            date: "2024-01-01".to_string(),
            campaign_id: "c1".to_string(),
            campaign_name: "campaign".to_string(),
            ad_group_id: "g1".to_string(),
            ad_group_name: "ad group".to_string(),
            search_term: "rust etl".to_string(),
            device: "MOBILE".to_string(),
            impressions: 100,
            clicks: 10,
            cost: 1.5,
            conversions: 0.5,
        }])
        .unwrap();

        assert_eq!(batch.num_rows(), 1);
        assert_eq!(batch.schema(), search_terms_schema());
    }
}
