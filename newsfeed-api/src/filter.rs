use std::cmp::Ordering;

use crate::{Record, Time};

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum OrderType {
    Asc,
    Desc,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Order {
    pub column: String,
    pub order: OrderType,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Condition {
    /// `column` equals the value
    Eq(String, String),

    /// `column` is an array containing all the values
    Contains(String, Vec<String>),

    /// `column` equals one of the values
    In(String, Vec<String>),
}

/// Row selection for a table fetch
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Filter {
    pub conditions: Vec<Condition>,
    pub order: Option<Order>,

    /// Column list with embedded relations, eg. `*,profile:profiles(username)`
    pub select: Option<String>,
}

impl Filter {
    pub fn all() -> Filter {
        Filter::default()
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Filter {
        self.conditions
            .push(Condition::Eq(String::from(column), value.to_string()));
        self
    }

    pub fn contains<I, T>(mut self, column: &str, values: I) -> Filter
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        self.conditions.push(Condition::Contains(
            String::from(column),
            values.into_iter().map(|v| v.to_string()).collect(),
        ));
        self
    }

    pub fn is_in<I, T>(mut self, column: &str, values: I) -> Filter
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        self.conditions.push(Condition::In(
            String::from(column),
            values.into_iter().map(|v| v.to_string()).collect(),
        ));
        self
    }

    pub fn order_by(mut self, column: &str, order: OrderType) -> Filter {
        self.order = Some(Order {
            column: String::from(column),
            order,
        });
        self
    }

    pub fn select(mut self, columns: &str) -> Filter {
        self.select = Some(String::from(columns));
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter().all(|c| match c {
            Condition::Eq(col, v) => record.get(col).and_then(|r| r.as_str()) == Some(v),
            Condition::Contains(col, vals) => match record.get(col).and_then(|r| r.as_array()) {
                None => false,
                Some(arr) => vals
                    .iter()
                    .all(|v| arr.iter().any(|a| a.as_str() == Some(v))),
            },
            Condition::In(col, vals) => match record.get(col).and_then(|r| r.as_str()) {
                None => false,
                Some(r) => vals.iter().any(|v| v == r),
            },
        })
    }

    /// Stable sort according to this filter's order, if any
    pub fn sort(&self, records: &mut [Record]) {
        let order = match &self.order {
            None => return,
            Some(o) => o,
        };
        records.sort_by(|a, b| {
            let res = compare_values(a.get(&order.column), b.get(&order.column));
            match order.order {
                OrderType::Asc => res,
                OrderType::Desc => res.reverse(),
            }
        });
    }

    /// Renders this filter as PostgREST query parameters
    pub fn to_postgrest(&self) -> Vec<(String, String)> {
        let mut res = Vec::new();
        if let Some(select) = &self.select {
            res.push((String::from("select"), select.clone()));
        }
        for c in &self.conditions {
            match c {
                Condition::Eq(col, v) => res.push((col.clone(), format!("eq.{v}"))),
                Condition::Contains(col, vals) => {
                    res.push((col.clone(), format!("cs.{{{}}}", quote_list(vals))))
                }
                Condition::In(col, vals) => {
                    res.push((col.clone(), format!("in.({})", quote_list(vals))))
                }
            }
        }
        if let Some(o) = &self.order {
            let dir = match o.order {
                OrderType::Asc => "asc",
                OrderType::Desc => "desc",
            };
            res.push((String::from("order"), format!("{}.{}", o.column, dir)));
        }
        res
    }
}

fn quote_list(vals: &[String]) -> String {
    vals.iter()
        .map(|v| format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(",")
}

// Timestamps do not compare properly as strings once fractional seconds
// differ in length, so try to parse them first
fn compare_values(a: Option<&Record>, b: Option<&Record>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => {
            if let (Some(a), Some(b)) = (a.as_str(), b.as_str()) {
                match (a.parse::<Time>(), b.parse::<Time>()) {
                    (Ok(a), Ok(b)) => a.cmp(&b),
                    _ => a.cmp(b),
                }
            } else if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                a.cmp(&b)
            } else if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            } else {
                Ordering::Equal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn matches_conditions() {
        let rec = json!({
            "id": "a",
            "categories": ["technology", "media"],
        });
        assert!(Filter::all().matches(&rec));
        assert!(Filter::all().eq("id", "a").matches(&rec));
        assert!(!Filter::all().eq("id", "b").matches(&rec));
        assert!(Filter::all().contains("categories", ["media"]).matches(&rec));
        assert!(!Filter::all().contains("categories", ["media", "new"]).matches(&rec));
        assert!(Filter::all().is_in("id", ["b", "a"]).matches(&rec));
        assert!(!Filter::all().is_in("id", Vec::<String>::new()).matches(&rec));
        assert!(!Filter::all().eq("missing", "a").matches(&rec));
    }

    #[test]
    fn sorts_timestamps_by_time() {
        let mut recs = vec![
            json!({ "t": "2024-01-01T00:00:00.500Z" }),
            json!({ "t": "2024-01-01T00:00:00Z" }),
            json!({ "t": "2024-01-01T00:00:01Z" }),
        ];
        Filter::all().order_by("t", OrderType::Asc).sort(&mut recs);
        assert_eq!(recs[0]["t"], "2024-01-01T00:00:00Z");
        assert_eq!(recs[1]["t"], "2024-01-01T00:00:00.500Z");
        assert_eq!(recs[2]["t"], "2024-01-01T00:00:01Z");
    }

    #[test]
    fn renders_postgrest_params() {
        let f = Filter::all()
            .select("*,profile:profiles(username,avatar_url)")
            .eq("news_id", "n1")
            .contains("categories", ["technology"])
            .is_in("id", ["a", "b"])
            .order_by("created_at", OrderType::Desc);
        assert_eq!(
            f.to_postgrest(),
            vec![
                (
                    String::from("select"),
                    String::from("*,profile:profiles(username,avatar_url)")
                ),
                (String::from("news_id"), String::from("eq.n1")),
                (String::from("categories"), String::from("cs.{\"technology\"}")),
                (String::from("id"), String::from("in.(\"a\",\"b\")")),
                (String::from("order"), String::from("created_at.desc")),
            ]
        );
    }
}
