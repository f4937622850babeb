// used to print out readable forms of a field value
use std::fmt;
// used to order rows by field values
use std::cmp::Ordering;
// used when counting distinct values
use std::hash::{Hash, Hasher};

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;

use crate::error::{InsightError, Result};

/// The two schemas a dataset can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    Sections,
    Rooms,
}

impl DatasetKind {
    pub fn name(&self) -> &'static str {
        match self {
            DatasetKind::Sections => "sections",
            DatasetKind::Rooms => "rooms",
        }
    }
    pub fn parse(name: &str) -> Option<DatasetKind> {
        match name.to_ascii_lowercase().as_str() {
            "sections" => Some(DatasetKind::Sections),
            "rooms" => Some(DatasetKind::Rooms),
            _ => None,
        }
    }
    pub fn text_fields(&self) -> &'static [&'static str] {
        match self {
            DatasetKind::Sections => Section::TEXT_FIELDS,
            DatasetKind::Rooms => Room::TEXT_FIELDS,
        }
    }
    pub fn numeric_fields(&self) -> &'static [&'static str] {
        match self {
            DatasetKind::Sections => Section::NUMERIC_FIELDS,
            DatasetKind::Rooms => Room::NUMERIC_FIELDS,
        }
    }
    /// Which of the two field sets `name` belongs to, if any.
    pub fn field_kind(&self, name: &str) -> Option<FieldKind> {
        if self.text_fields().contains(&name) {
            Some(FieldKind::Text)
        } else if self.numeric_fields().contains(&name) {
            Some(FieldKind::Numeric)
        } else {
            None
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Serialize for DatasetKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Numeric,
}

// ------------- FieldValue -------------
#[derive(Debug, Clone)]
pub enum FieldValue {
    Text(String),
    Number(f64),
}

// integral numbers up to this magnitude print and serialize without a fraction
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

fn integral(n: f64) -> Option<i64> {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < MAX_EXACT_INTEGER {
        Some(n as i64)
    } else {
        None
    }
}

impl FieldValue {
    /// Numeric reading of the value; text that does not parse reads as NaN.
    pub fn as_number(&self) -> f64 {
        match self {
            FieldValue::Number(n) => *n,
            FieldValue::Text(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        }
    }
    pub fn as_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(_) => self.to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{s}"),
            FieldValue::Number(n) => match integral(*n) {
                Some(i) => write!(f, "{i}"),
                None => write!(f, "{n}"),
            },
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => a == b,
            (FieldValue::Number(a), FieldValue::Number(b)) => a == b,
            _ => false,
        }
    }
}
// NaN never reaches a bucket, so treating equality as total is fine here
impl Eq for FieldValue {}

impl Hash for FieldValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            FieldValue::Text(s) => {
                0u8.hash(state);
                s.hash(state);
            }
            FieldValue::Number(n) => {
                1u8.hash(state);
                // -0.0 == 0.0, so they must hash alike
                let n = if *n == 0.0 { 0.0 } else { *n };
                n.to_bits().hash(state);
            }
        }
    }
}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for FieldValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (FieldValue::Number(a), FieldValue::Number(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            (FieldValue::Number(_), FieldValue::Text(_)) => Ordering::Less,
            (FieldValue::Text(_), FieldValue::Number(_)) => Ordering::Greater,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::Number(n) => match integral(*n) {
                Some(i) => serializer.serialize_i64(i),
                None => serializer.serialize_f64(*n),
            },
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}
impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}
impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

// ------------- Row -------------
/// A flat result row. Column order is kept and is the order the row
/// serializes in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, FieldValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self { columns: Vec::new() }
    }
    pub fn with_capacity(capacity: usize) -> Self {
        Self { columns: Vec::with_capacity(capacity) }
    }
    /// Sets a column, replacing the value if the column is already present.
    pub fn insert(&mut self, column: impl Into<String>, value: FieldValue) {
        let column = column.into();
        match self.columns.iter_mut().find(|(c, _)| *c == column) {
            Some((_, v)) => *v = value,
            None => self.columns.push((column, value)),
        }
    }
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.columns.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }
    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(c, _)| c.as_str())
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.columns.iter().map(|(c, v)| (c.as_str(), v))
    }
    pub fn len(&self) -> usize {
        self.columns.len()
    }
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in &self.columns {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

// ------------- FieldAccessor -------------
/// Field-by-name access shared by all record variants.
pub trait FieldAccessor {
    const KIND: DatasetKind;
    const TEXT_FIELDS: &'static [&'static str];
    const NUMERIC_FIELDS: &'static [&'static str];

    fn field(&self, name: &str) -> Result<FieldValue>;

    /// Materializes the record as `<dataset_id>_<field>` columns, text fields
    /// first, each coerced to the type of its field set.
    fn to_qualified_row(&self, dataset_id: &str) -> Result<Row> {
        let mut row = Row::with_capacity(Self::TEXT_FIELDS.len() + Self::NUMERIC_FIELDS.len());
        for name in Self::TEXT_FIELDS {
            let value = self.field(name)?;
            row.insert(format!("{dataset_id}_{name}"), FieldValue::Text(value.as_text()));
        }
        for name in Self::NUMERIC_FIELDS {
            let value = self.field(name)?;
            row.insert(format!("{dataset_id}_{name}"), FieldValue::Number(value.as_number()));
        }
        Ok(row)
    }
}

fn unknown_field(kind: DatasetKind, name: &str) -> InsightError {
    InsightError::Validation(format!("Unknown field '{name}' for {kind}"))
}

// ------------- Section -------------
#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
pub struct Section {
    pub uuid: String,
    pub id: String,
    pub title: String,
    pub instructor: String,
    pub dept: String,
    pub year: f64,
    pub avg: f64,
    pub pass: f64,
    pub fail: f64,
    pub audit: f64,
}

impl FieldAccessor for Section {
    const KIND: DatasetKind = DatasetKind::Sections;
    const TEXT_FIELDS: &'static [&'static str] = &["dept", "id", "instructor", "title", "uuid"];
    const NUMERIC_FIELDS: &'static [&'static str] = &["avg", "pass", "fail", "audit", "year"];

    fn field(&self, name: &str) -> Result<FieldValue> {
        let value = match name {
            "uuid" => FieldValue::from(self.uuid.as_str()),
            "id" => FieldValue::from(self.id.as_str()),
            "title" => FieldValue::from(self.title.as_str()),
            "instructor" => FieldValue::from(self.instructor.as_str()),
            "dept" => FieldValue::from(self.dept.as_str()),
            "year" => FieldValue::Number(self.year),
            "avg" => FieldValue::Number(self.avg),
            "pass" => FieldValue::Number(self.pass),
            "fail" => FieldValue::Number(self.fail),
            "audit" => FieldValue::Number(self.audit),
            _ => return Err(unknown_field(Self::KIND, name)),
        };
        Ok(value)
    }
}

// ------------- Room -------------
#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
pub struct Room {
    pub fullname: String,
    pub shortname: String,
    pub number: String,
    // derived from shortname and number when left out
    #[serde(default)]
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lon: f64,
    pub seats: f64,
    #[serde(rename = "type")]
    pub room_type: String,
    pub furniture: String,
    pub href: String,
}

impl Room {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fullname: &str,
        shortname: &str,
        number: &str,
        address: &str,
        lat: f64,
        lon: f64,
        seats: f64,
        room_type: &str,
        furniture: &str,
        href: &str,
    ) -> Self {
        Self {
            fullname: fullname.to_string(),
            shortname: shortname.to_string(),
            number: number.to_string(),
            name: format!("{shortname}_{number}"),
            address: address.to_string(),
            lat,
            lon,
            seats,
            room_type: room_type.to_string(),
            furniture: furniture.to_string(),
            href: href.to_string(),
        }
    }
    fn with_derived_name(mut self) -> Self {
        if self.name.is_empty() {
            self.name = format!("{}_{}", self.shortname, self.number);
        }
        self
    }
}

impl FieldAccessor for Room {
    const KIND: DatasetKind = DatasetKind::Rooms;
    const TEXT_FIELDS: &'static [&'static str] =
        &["fullname", "shortname", "number", "name", "address", "type", "furniture", "href"];
    const NUMERIC_FIELDS: &'static [&'static str] = &["lat", "lon", "seats"];

    fn field(&self, name: &str) -> Result<FieldValue> {
        let value = match name {
            "fullname" => FieldValue::from(self.fullname.as_str()),
            "shortname" => FieldValue::from(self.shortname.as_str()),
            "number" => FieldValue::from(self.number.as_str()),
            "name" => FieldValue::from(self.name.as_str()),
            "address" => FieldValue::from(self.address.as_str()),
            "type" => FieldValue::from(self.room_type.as_str()),
            "furniture" => FieldValue::from(self.furniture.as_str()),
            "href" => FieldValue::from(self.href.as_str()),
            "lat" => FieldValue::Number(self.lat),
            "lon" => FieldValue::Number(self.lon),
            "seats" => FieldValue::Number(self.seats),
            _ => return Err(unknown_field(Self::KIND, name)),
        };
        Ok(value)
    }
}

// ------------- Record -------------
/// A row of a dataset, dispatching to the variant's [`FieldAccessor`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Record {
    Section(Section),
    Room(Room),
}

impl Record {
    pub fn kind(&self) -> DatasetKind {
        match self {
            Record::Section(_) => Section::KIND,
            Record::Room(_) => Room::KIND,
        }
    }
    pub fn field(&self, name: &str) -> Result<FieldValue> {
        match self {
            Record::Section(s) => s.field(name),
            Record::Room(r) => r.field(name),
        }
    }
    pub fn to_qualified_row(&self, dataset_id: &str) -> Result<Row> {
        match self {
            Record::Section(s) => s.to_qualified_row(dataset_id),
            Record::Room(r) => r.to_qualified_row(dataset_id),
        }
    }
    /// Decodes one record of the given kind from its JSON form.
    pub fn from_json(kind: DatasetKind, value: serde_json::Value) -> Result<Record> {
        let record = match kind {
            DatasetKind::Sections => serde_json::from_value::<Section>(value).map(Record::Section),
            DatasetKind::Rooms => serde_json::from_value::<Room>(value)
                .map(|room| Record::Room(room.with_derived_name())),
        };
        record.map_err(|e| InsightError::Validation(format!("Invalid {kind} record: {e}")))
    }
}

impl From<Section> for Record {
    fn from(section: Section) -> Self {
        Record::Section(section)
    }
}
impl From<Room> for Record {
    fn from(room: Room) -> Self {
        Record::Room(room)
    }
}
