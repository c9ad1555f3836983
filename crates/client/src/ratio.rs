use std::collections::HashMap;

use bwq_common::{BwqError, Result};
use bwq_planner::CountType;
use bwq_storage::{ResultSet, Row, Value};

/// Combine separately fetched numerator and denominator counts.
///
/// Rows follow the denominator when there is one, so groups with no
/// numerator row still appear with zero counts. Statistics use
/// [`CountType::evaluate`], the same zero-guarded arithmetic as the SQL path.
pub fn compose_ratio(
    numerator: &ResultSet,
    denominator: Option<&ResultSet>,
    groupings: &[String],
    counttypes: &[CountType],
) -> Result<ResultSet> {
    let num_keys = key_indexes(numerator, groupings)?;
    let mut by_group: HashMap<Vec<String>, &Row> = HashMap::with_capacity(numerator.rows.len());
    for row in &numerator.rows {
        by_group.insert(group_key(row, &num_keys), row);
    }

    let mut columns = groupings.to_vec();
    columns.extend(counttypes.iter().map(|c| c.name().to_string()));

    let rows = match denominator {
        Some(den) => {
            let den_keys = key_indexes(den, groupings)?;
            den.rows
                .iter()
                .map(|den_row| {
                    let key = group_key(den_row, &den_keys);
                    let num_row = by_group.get(&key).copied();
                    output_row(den_row, &den_keys, num_row, numerator, Some((den_row, den)), counttypes)
                })
                .collect()
        }
        None => numerator
            .rows
            .iter()
            .map(|row| output_row(row, &num_keys, Some(row), numerator, None, counttypes))
            .collect(),
    };
    Ok(ResultSet::new(columns, rows))
}

fn key_indexes(rs: &ResultSet, groupings: &[String]) -> Result<Vec<usize>> {
    groupings
        .iter()
        .map(|g| {
            rs.column_index(g)
                .ok_or_else(|| BwqError::Execution(format!("counts result has no column {g}")))
        })
        .collect()
}

fn group_key(row: &Row, indexes: &[usize]) -> Vec<String> {
    indexes
        .iter()
        .map(|i| row.get(*i).map(Value::to_string).unwrap_or_default())
        .collect()
}

fn count(row: Option<&Row>, rs: &ResultSet, column: &str) -> Option<f64> {
    let idx = rs.column_index(column)?;
    row?.get(idx)?.as_f64()
}

fn output_row(
    key_row: &Row,
    key_indexes: &[usize],
    num_row: Option<&Row>,
    numerator: &ResultSet,
    den: Option<(&Row, &ResultSet)>,
    counttypes: &[CountType],
) -> Row {
    let mut out: Row = key_indexes
        .iter()
        .map(|i| key_row.get(*i).cloned().unwrap_or(Value::Null))
        .collect();
    for ct in counttypes {
        let col = ct.base().column();
        let n = count(num_row, numerator, col);
        let d = den.and_then(|(row, rs)| count(Some(row), rs, col));
        out.push(Value::Float(ct.evaluate(n, d)));
    }
    out
}

#[cfg(test)]
mod tests {
    use bwq_planner::CountType;
    use bwq_storage::{ResultSet, Value};

    use super::compose_ratio;

    fn rs(rows: &[(i64, i64)]) -> ResultSet {
        ResultSet::new(
            vec!["year".to_string(), "TextCount".to_string()],
            rows.iter()
                .map(|(y, c)| vec![Value::Int(*y), Value::Int(*c)])
                .collect(),
        )
    }

    #[test]
    fn denominator_rows_drive_output() {
        let num = rs(&[(1900, 1)]);
        let den = rs(&[(1900, 4), (1901, 0), (1902, 5)]);
        let out = compose_ratio(
            &num,
            Some(&den),
            &["year".to_string()],
            &[CountType::TextPercent, CountType::TotalTexts],
        )
        .expect("compose");
        assert_eq!(out.columns, vec!["year", "TextPercent", "TotalTexts"]);
        assert_eq!(
            out.rows,
            vec![
                vec![Value::Int(1900), Value::Float(25.0), Value::Float(4.0)],
                vec![Value::Int(1901), Value::Float(0.0), Value::Float(0.0)],
                vec![Value::Int(1902), Value::Float(0.0), Value::Float(5.0)],
            ]
        );
    }

    #[test]
    fn missing_group_column_is_an_error() {
        let num = rs(&[(1900, 1)]);
        assert!(compose_ratio(&num, None, &["w1".to_string()], &[CountType::TextCount]).is_err());
    }
}
