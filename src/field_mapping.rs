//! Field Mapper
//!
//! Renames heterogeneous store columns (`storage_location`, `supplierName`,
//! ...) into a rule's display schema. Resolution per display field:
//!
//! 1. a raw column literally named like the field
//! 2. the first present column from the field's synonym list
//! 3. the raw column at the field's ordinal position
//! 4. `""`
//!
//! Every output row carries exactly the schema's fields, in schema order,
//! even when nothing resolved. Unresolved fields are not an error; they are
//! logged once per call at `debug` as `FieldMappingGap`.

use std::collections::BTreeSet;

use intent_router_types::DisplayRow;
use serde_json::Value;
use tracing::debug;

use crate::executor::RawRow;

/// Display field → raw column names, most specific first.
pub const FIELD_SYNONYMS: &[(&str, &[&str])] = &[
    ("工厂", &["factory", "storage_location", "storageLocation", "plant"]),
    ("仓库", &["warehouse", "warehouse_name", "warehouseName"]),
    ("物料编码", &["material_code", "materialCode", "item_code", "itemCode"]),
    ("物料名称", &["material_name", "materialName", "item_name", "itemName"]),
    ("供应商", &["supplier", "supplier_name", "supplierName"]),
    ("数量", &["quantity", "qty", "amount"]),
    ("状态", &["status", "inventory_status", "inventoryStatus"]),
    ("入库时间", &["inbound_time", "inboundTime", "inbound_date", "inboundDate"]),
    ("入库日期", &["inbound_date", "inboundDate", "inbound_time", "inboundTime"]),
    ("测试编号", &["test_id", "testId", "test_no", "testNo"]),
    ("日期", &["test_date", "testDate", "date"]),
    ("检验日期", &["inspection_date", "inspectionDate", "test_date", "testDate"]),
    ("项目", &["project", "project_name", "projectName"]),
    ("基线", &["baseline", "baseline_name", "baselineName"]),
    ("测试结果", &["test_result", "testResult", "result"]),
    ("不合格描述", &["defect_desc", "defectDesc", "defect_description", "defectDescription"]),
    ("批次", &["batch_code", "batchCode", "batch_no", "batchNo", "batch"]),
    ("批次号", &["batch_code", "batchCode", "batch_no", "batchNo", "batch"]),
    ("不良率", &["defect_rate", "defectRate"]),
    ("本周异常", &["weekly_anomaly", "weeklyAnomaly", "anomaly"]),
    ("产线异常", &["production_anomaly", "productionAnomaly", "line_anomaly"]),
    ("测试异常", &["test_anomaly", "testAnomaly"]),
    ("对比维度", &["dimension", "compare_key", "compareKey"]),
    ("备注", &["notes", "remark", "remarks", "comment"]),
];

/// Synonym columns for a display field (empty when none are declared).
pub fn synonyms_for(field: &str) -> &'static [&'static str] {
    FIELD_SYNONYMS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, columns)| *columns)
        .unwrap_or(&[])
}

/// Map raw rows into display rows over `result_fields`.
pub fn map_fields(raw_rows: &[RawRow], result_fields: &[String]) -> Vec<DisplayRow> {
    let mut gaps = BTreeSet::new();
    let mut gap_rows = 0usize;

    let rows = raw_rows
        .iter()
        .map(|raw| {
            let mut row = DisplayRow::new();
            let mut complete = true;
            for (idx, field) in result_fields.iter().enumerate() {
                let value = resolve(raw, field, idx).unwrap_or_else(|| {
                    complete = false;
                    gaps.insert(field.as_str());
                    Value::String(String::new())
                });
                row.insert(field.clone(), value);
            }
            if !complete {
                gap_rows += 1;
            }
            row
        })
        .collect();

    if !gaps.is_empty() {
        debug!(
            "FieldMappingGap: {} of {} rows had unresolved fields {:?}",
            gap_rows,
            raw_rows.len(),
            gaps
        );
    }
    rows
}

fn resolve(raw: &RawRow, field: &str, idx: usize) -> Option<Value> {
    let value = raw
        .get(field)
        .or_else(|| synonyms_for(field).iter().find_map(|col| raw.get(*col)))
        .or_else(|| raw.values().nth(idx))?;

    Some(match value {
        Value::Null => Value::String(String::new()),
        other => other.clone(),
    })
}
