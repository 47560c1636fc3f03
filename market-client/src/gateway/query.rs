use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Направление сортировки.
pub enum Direction {
    /// По возрастанию.
    Asc,
    /// По убыванию.
    Desc,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Условие на одну колонку.
pub enum Filter {
    /// `column = value`.
    Eq {
        /// Колонка.
        column: String,
        /// Значение.
        value: String,
    },
    /// `column IN (values)`.
    In {
        /// Колонка.
        column: String,
        /// Допустимые значения.
        values: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Выборка из таблицы: фильтры, сортировка по одной колонке и лимит строк.
pub struct Query {
    filters: Vec<Filter>,
    order: Option<(String, Direction)>,
    limit: Option<u32>,
}

impl Query {
    /// Пустая выборка (все строки, видимые политиками доступа).
    pub fn new() -> Self {
        Self::default()
    }

    /// Выборка одной строки по `id`.
    pub fn by_id(id: impl ToString) -> Self {
        Self::new().eq("id", id)
    }

    /// Добавляет условие равенства.
    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push(Filter::Eq {
            column: column.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// Добавляет условие «значение из множества».
    pub fn in_<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        self.filters.push(Filter::In {
            column: column.to_string(),
            values: values.into_iter().map(|value| value.to_string()).collect(),
        });
        self
    }

    /// Задаёт сортировку.
    pub fn order(mut self, column: &str, direction: Direction) -> Self {
        self.order = Some((column.to_string(), direction));
        self
    }

    /// Ограничивает число строк.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Фильтры выборки.
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Сортировка выборки.
    pub fn ordering(&self) -> Option<(&str, Direction)> {
        self.order
            .as_ref()
            .map(|(column, direction)| (column.as_str(), *direction))
    }

    /// Лимит строк.
    pub fn row_limit(&self) -> Option<u32> {
        self.limit
    }

    /// Параметры строки запроса в синтаксисе PostgREST.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        for filter in &self.filters {
            match filter {
                Filter::Eq { column, value } => {
                    params.push((column.clone(), format!("eq.{value}")));
                }
                Filter::In { column, values } => {
                    let list = values
                        .iter()
                        .map(|value| quote_list_item(value))
                        .collect::<Vec<_>>()
                        .join(",");
                    params.push((column.clone(), format!("in.({list})")));
                }
            }
        }
        if let Some((column, direction)) = &self.order {
            params.push(("order".to_string(), format!("{column}.{}", direction.as_str())));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    /// Проверяет, подходит ли JSON-строка под фильтры выборки.
    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|filter| match filter {
            Filter::Eq { column, value } => column_text(row, column).as_deref() == Some(value),
            Filter::In { column, values } => column_text(row, column)
                .is_some_and(|text| values.iter().any(|value| *value == text)),
        })
    }
}

fn column_text(row: &Value, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

// Значения со служебными символами PostgREST требуют кавычек внутри in.(...).
fn quote_list_item(value: &str) -> String {
    if value.contains([',', '(', ')', '"', '\\']) {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    } else {
        value.to_string()
    }
}
