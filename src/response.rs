//! Response Composer
//!
//! Picks the output shape for a matched rule and assembles the payload:
//!
//! - chart: the catalog has a chart entry for the rule's category
//! - table + cards: tabular categories (inventory, test, production, batch, comparison)
//! - textual reply: everything else
//!
//! Cards are fixed aggregations per category over the display rows.

use std::collections::{HashMap, HashSet};

use intent_router_types::{Card, CardTone, ChartData, DisplayRow, RouteResponse};
use serde_json::Value;

use crate::catalog::{Category, ChartSpec, IntentRule};

/// Test results counted as passing / failing.
const PASS_RESULTS: &[&str] = &["合格", "OK", "PASS"];
const FAIL_RESULTS: &[&str] = &["不合格", "NG", "FAIL"];

/// Anomaly cells meaning "nothing to report".
const NO_ANOMALY: &[&str] = &["", "无", "-"];

/// Compose the response for `rule` from its mapped rows.
pub fn compose(rule: &IntentRule, rows: Vec<DisplayRow>, chart: Option<&ChartSpec>) -> RouteResponse {
    if let Some(spec) = chart {
        return RouteResponse::chart(rule.name.clone(), spec.chart_type, chart_data(&rows, spec));
    }

    if rule.category.is_tabular() {
        let cards = cards_for(rule.category, &rows);
        return RouteResponse::table(rule.name.clone(), rows, cards);
    }

    RouteResponse::reply(textual_reply(rule, rows.len()), Some(rule.name.clone()))
}

fn textual_reply(rule: &IntentRule, count: usize) -> String {
    let subject = rule.description.as_deref().unwrap_or(&rule.name);
    if count == 0 {
        format!("{}：未找到相关记录。", subject)
    } else {
        format!("{}：共找到 {} 条相关记录。", subject, count)
    }
}

// ============================================================================
// Charts
// ============================================================================

/// Group rows by the label field (first-seen order); sum the value field, or count rows.
pub fn chart_data(rows: &[DisplayRow], spec: &ChartSpec) -> ChartData {
    let mut labels: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut values: Vec<f64> = Vec::new();

    for row in rows {
        let label = row.text(&spec.label_field);
        let slot = *index.entry(label.clone()).or_insert_with(|| {
            labels.push(label);
            values.push(0.0);
            values.len() - 1
        });
        values[slot] += match &spec.value_field {
            Some(field) => row.get(field).and_then(numeric).unwrap_or(0.0),
            None => 1.0,
        };
    }

    ChartData { labels, values }
}

// ============================================================================
// Cards
// ============================================================================

pub fn cards_for(category: Category, rows: &[DisplayRow]) -> Vec<Card> {
    match category {
        Category::Inventory => vec![
            Card::new("物料种类", distinct_materials(rows), CardTone::Info),
            Card::new("库存总量", number(sum(rows, "数量")), CardTone::Info),
            Card::new("风险库存", count_where(rows, "状态", |s| s == "风险"), CardTone::Warning),
            Card::new("冻结库存", count_where(rows, "状态", |s| s == "冻结"), CardTone::Danger),
            Card::new("供应商数", distinct(rows, "供应商"), CardTone::Info),
        ],
        Category::Test => {
            let total = rows.len();
            let pass = count_where(rows, "测试结果", |s| is_one_of(s, PASS_RESULTS));
            let fail = count_where(rows, "测试结果", |s| is_one_of(s, FAIL_RESULTS));
            let rate = if total == 0 {
                0.0
            } else {
                pass as f64 * 100.0 / total as f64
            };
            let rate_tone = if total > 0 && fail == 0 {
                CardTone::Success
            } else {
                CardTone::Warning
            };
            vec![
                Card::new("测试总数", total, CardTone::Info),
                Card::new("合格", pass, CardTone::Success),
                Card::new("不合格", fail, CardTone::Danger),
                Card::new("合格率", format!("{:.1}%", rate), rate_tone),
            ]
        }
        Category::Production => {
            let rates: Vec<f64> = rows
                .iter()
                .filter_map(|r| r.get("不良率").and_then(numeric))
                .collect();
            let average = if rates.is_empty() {
                0.0
            } else {
                rates.iter().sum::<f64>() / rates.len() as f64
            };
            vec![
                Card::new("记录数", rows.len(), CardTone::Info),
                Card::new("平均不良率", format!("{:.2}%", average), CardTone::Warning),
                Card::new("异常记录", count_where(rows, "本周异常", is_anomaly), CardTone::Danger),
                Card::new("工厂数", distinct(rows, "工厂"), CardTone::Info),
            ]
        }
        Category::Batch => {
            let abnormal = rows
                .iter()
                .filter(|r| is_anomaly(&r.text("产线异常")) || is_anomaly(&r.text("测试异常")))
                .count();
            vec![
                Card::new("批次数", distinct(rows, "批次号"), CardTone::Info),
                Card::new("物料种类", distinct_materials(rows), CardTone::Info),
                Card::new("异常批次", abnormal, CardTone::Danger),
            ]
        }
        Category::Comparison => {
            let items = match distinct(rows, "对比维度") {
                0 => rows.len(),
                n => n,
            };
            vec![
                Card::new("对比项", items, CardTone::Info),
                Card::new("供应商数", distinct(rows, "供应商"), CardTone::Info),
            ]
        }
        Category::Exploratory | Category::Trend | Category::General => Vec::new(),
    }
}

fn is_one_of(value: &str, set: &[&str]) -> bool {
    set.iter().any(|s| s.eq_ignore_ascii_case(value.trim()))
}

fn is_anomaly(value: &str) -> bool {
    !NO_ANOMALY.contains(&value.trim())
}

fn count_where(rows: &[DisplayRow], field: &str, pred: impl Fn(&str) -> bool) -> usize {
    rows.iter().filter(|r| pred(r.text(field).trim())).count()
}

fn distinct(rows: &[DisplayRow], field: &str) -> usize {
    rows.iter()
        .map(|r| r.text(field))
        .filter(|v| !v.trim().is_empty())
        .collect::<HashSet<_>>()
        .len()
}

/// Distinct materials by code, falling back to name when the code is blank.
fn distinct_materials(rows: &[DisplayRow]) -> usize {
    rows.iter()
        .map(|r| {
            let code = r.text("物料编码");
            if code.trim().is_empty() {
                r.text("物料名称")
            } else {
                code
            }
        })
        .filter(|v| !v.trim().is_empty())
        .collect::<HashSet<_>>()
        .len()
}

fn sum(rows: &[DisplayRow], field: &str) -> f64 {
    rows.iter().filter_map(|r| r.get(field).and_then(numeric)).sum()
}

/// Numbers, and strings like "1,200" or "1.5%".
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_end_matches('%')
            .replace(',', "")
            .parse::<f64>()
            .ok(),
        _ => None,
    }
}

/// Whole numbers as integers, otherwise rounded to two decimals.
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from((value * 100.0).round() / 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::rule;
    use intent_router_types::{ChartType, ResponseData};
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> DisplayRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn card<'a>(cards: &'a [Card], title: &str) -> &'a Value {
        &cards.iter().find(|c| c.title == title).unwrap().value
    }

    #[test]
    fn test_inventory_table_and_cards() {
        let r = rule(1, "库存查询", Category::Inventory, &["库存"]);
        let rows = vec![
            row(&[("物料编码", json!("M1")), ("供应商", json!("聚龙")), ("数量", json!(500)), ("状态", json!("正常"))]),
            row(&[("物料编码", json!("M1")), ("供应商", json!("欣旺达")), ("数量", json!("1,200")), ("状态", json!("风险"))]),
            row(&[("物料编码", json!("M2")), ("供应商", json!("聚龙")), ("数量", json!(30)), ("状态", json!("冻结"))]),
        ];

        let resp = compose(&r, rows, None);
        assert!(resp.success);
        assert_eq!(resp.table_data().unwrap().len(), 3);
        let cards = resp.cards().unwrap();
        assert_eq!(card(cards, "物料种类"), &json!(2));
        assert_eq!(card(cards, "库存总量"), &json!(1730));
        assert_eq!(card(cards, "风险库存"), &json!(1));
        assert_eq!(card(cards, "冻结库存"), &json!(1));
        assert_eq!(card(cards, "供应商数"), &json!(2));
    }

    #[test]
    fn test_test_cards_pass_rate() {
        let rows = vec![
            row(&[("测试结果", json!("合格"))]),
            row(&[("测试结果", json!("pass"))]),
            row(&[("测试结果", json!("NG"))]),
            row(&[("测试结果", json!("待定"))]),
        ];
        let cards = cards_for(Category::Test, &rows);
        assert_eq!(card(&cards, "测试总数"), &json!(4));
        assert_eq!(card(&cards, "合格"), &json!(2));
        assert_eq!(card(&cards, "不合格"), &json!(1));
        assert_eq!(card(&cards, "合格率"), &json!("50.0%"));
    }

    #[test]
    fn test_production_cards() {
        let rows = vec![
            row(&[("工厂", json!("深圳工厂")), ("不良率", json!("1.5%")), ("本周异常", json!("无"))]),
            row(&[("工厂", json!("重庆工厂")), ("不良率", json!("2.5%")), ("本周异常", json!("来料划伤"))]),
        ];
        let cards = cards_for(Category::Production, &rows);
        assert_eq!(card(&cards, "平均不良率"), &json!("2.00%"));
        assert_eq!(card(&cards, "异常记录"), &json!(1));
        assert_eq!(card(&cards, "工厂数"), &json!(2));
    }

    #[test]
    fn test_batch_cards() {
        let rows = vec![
            row(&[("批次号", json!("B1")), ("物料名称", json!("电池盖")), ("产线异常", json!("")), ("测试异常", json!("无"))]),
            row(&[("批次号", json!("B2")), ("物料名称", json!("电池盖")), ("产线异常", json!("")), ("测试异常", json!("尺寸超差"))]),
        ];
        let cards = cards_for(Category::Batch, &rows);
        assert_eq!(card(&cards, "批次数"), &json!(2));
        assert_eq!(card(&cards, "物料种类"), &json!(1));
        assert_eq!(card(&cards, "异常批次"), &json!(1));
    }

    #[test]
    fn test_chart_groups_and_sums() {
        let mut r = rule(2, "不良趋势", Category::Trend, &["趋势"]);
        r.result_fields = vec!["检验日期".into(), "不良率".into()];
        let spec = ChartSpec {
            category: Category::Trend,
            chart_type: ChartType::Line,
            label_field: "检验日期".into(),
            value_field: Some("不良率".into()),
        };
        let rows = vec![
            row(&[("检验日期", json!("W1")), ("不良率", json!("1.5%"))]),
            row(&[("检验日期", json!("W2")), ("不良率", json!(2))]),
            row(&[("检验日期", json!("W1")), ("不良率", json!("0.5"))]),
        ];

        let resp = compose(&r, rows, Some(&spec));
        match resp.data {
            Some(ResponseData::Chart {
                chart_type,
                chart_data,
            }) => {
                assert_eq!(chart_type, ChartType::Line);
                assert_eq!(chart_data.labels, vec!["W1", "W2"]);
                assert_eq!(chart_data.values, vec![2.0, 2.0]);
            }
            other => panic!("Expected chart, got {:?}", other),
        }
    }

    #[test]
    fn test_chart_counts_without_value_field() {
        let spec = ChartSpec {
            category: Category::Trend,
            chart_type: ChartType::Pie,
            label_field: "供应商".into(),
            value_field: None,
        };
        let rows = vec![
            row(&[("供应商", json!("聚龙"))]),
            row(&[("供应商", json!("聚龙"))]),
            row(&[("供应商", json!("BOE"))]),
        ];
        let data = chart_data(&rows, &spec);
        assert_eq!(data.values, vec![2.0, 1.0]);
    }

    #[test]
    fn test_non_tabular_rule_gets_textual_reply() {
        let mut r = rule(3, "数据总览", Category::Exploratory, &["总览"]);
        r.description = Some("全部物料数据总览".into());
        let resp = compose(&r, vec![DisplayRow::new(), DisplayRow::new()], None);
        assert!(resp.success);
        assert!(resp.data.is_none());
        assert_eq!(resp.reply.as_deref(), Some("全部物料数据总览：共找到 2 条相关记录。"));
        assert_eq!(resp.matched_rule.as_deref(), Some("数据总览"));
    }

    #[test]
    fn test_empty_table_still_has_cards() {
        let r = rule(1, "测试查询", Category::Test, &["测试"]);
        let resp = compose(&r, vec![], None);
        assert_eq!(resp.table_data().unwrap().len(), 0);
        assert_eq!(card(resp.cards().unwrap(), "合格率"), &json!("0.0%"));
    }
}
