//! Fixed layout of the property detail page.
//!
//! Header fields are (selector -> field) pairs. Repeating sections map cells
//! to fields by position; a row whose presence field is empty is dropped.
//! Everything here is data: the traversal lives in `parser`.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Selector;

use crate::crawler::models::{Improvement, ImprovementDetail, Jurisdiction, Land, PropertyRecord, RollValue};

static MONEY_NOISE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[$,]").unwrap());
static SQFT_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s*sq\.?\s*ft\.?$").unwrap());

pub static TABLES: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
pub static ROWS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
pub static DATA_CELLS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
/// Header and data cells alike, for tables that mix label and value cells.
pub static ALL_CELLS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th, td").unwrap());

/// How raw cell text is normalised before it lands in a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clean {
    Trim,
    Money,
    Sqft,
    Percent,
}

impl Clean {
    pub fn apply(self, raw: &str) -> String {
        let trimmed = raw.trim();
        match self {
            Clean::Trim => trimmed.to_string(),
            Clean::Money => MONEY_NOISE.replace_all(trimmed, "").trim().to_string(),
            Clean::Sqft => {
                let without_unit = SQFT_SUFFIX.replace(trimmed, "");
                MONEY_NOISE.replace_all(&without_unit, "").trim().to_string()
            }
            Clean::Percent => trimmed.replace('%', "").trim().to_string(),
        }
    }
}

pub struct HeaderField {
    pub name: &'static str,
    pub selector: &'static str,
    pub clean: Clean,
    pub set: fn(&mut PropertyRecord, String),
}

pub const HEADER_FIELDS: &[HeaderField] = &[
    HeaderField {
        name: "property_id",
        selector: "#propertyDetails > table > tbody > tr:nth-child(2) > td:nth-child(2)",
        clean: Clean::Trim,
        set: |r, v| r.page_property_id = v,
    },
    HeaderField {
        name: "legal_description",
        selector: "#propertyDetails > table > tbody > tr:nth-child(2) > td.propertyDetailsLegalDescription",
        clean: Clean::Trim,
        set: |r, v| r.legal_description = v,
    },
    HeaderField {
        name: "geographic_id",
        selector: "#propertyDetails > table > tbody > tr:nth-child(3) > td:nth-child(2)",
        clean: Clean::Trim,
        set: |r, v| r.geographic_id = v,
    },
    HeaderField {
        name: "zoning",
        selector: "#propertyDetails > table > tbody > tr:nth-child(3) > td:nth-child(4)",
        clean: Clean::Trim,
        set: |r, v| r.zoning = v,
    },
    HeaderField {
        name: "address",
        selector: "#propertyDetails > table > tbody > tr:nth-child(8) > td:nth-child(2)",
        clean: Clean::Trim,
        set: |r, v| r.address = v,
    },
    HeaderField {
        name: "neighborhood",
        selector: "#propertyDetails > table > tbody > tr:nth-child(9) > td:nth-child(2)",
        clean: Clean::Trim,
        set: |r, v| r.neighborhood = v,
    },
    HeaderField {
        name: "mapsco_id",
        selector: "#propertyDetails > table > tbody > tr:nth-child(9) > td:nth-child(4)",
        clean: Clean::Trim,
        set: |r, v| r.mapsco_id = v,
    },
    HeaderField {
        name: "neighborhood_code",
        selector: "#propertyDetails > table > tbody > tr:nth-child(10) > td:nth-child(2)",
        clean: Clean::Trim,
        set: |r, v| r.neighborhood_code = v,
    },
    HeaderField {
        name: "owner_name",
        selector: "#propertyDetails > table > tbody > tr:nth-child(12) > td:nth-child(2)",
        clean: Clean::Trim,
        set: |r, v| r.owner_name = v,
    },
    HeaderField {
        name: "owner_id",
        selector: "#propertyDetails > table > tbody > tr:nth-child(12) > td:nth-child(4)",
        clean: Clean::Trim,
        set: |r, v| r.owner_id = v,
    },
    HeaderField {
        name: "owner_mailing_address",
        selector: "#propertyDetails > table > tbody > tr:nth-child(13) > td:nth-child(2)",
        clean: Clean::Trim,
        set: |r, v| r.owner_mailing_address = v,
    },
    HeaderField {
        name: "ownership_percentage",
        selector: "#propertyDetails > table > tbody > tr:nth-child(13) > td:nth-child(4)",
        clean: Clean::Percent,
        set: |r, v| r.ownership_percentage = v,
    },
    HeaderField {
        name: "exemptions",
        selector: "#propertyDetails > table > tbody > tr:nth-child(14) > td:nth-child(4)",
        clean: Clean::Trim,
        set: |r, v| r.exemptions = v,
    },
];

pub struct Column<T> {
    pub index: usize,
    pub clean: Clean,
    pub set: fn(&mut T, String),
}

/// Positional mapping for one row type.
pub struct RowLayout<T: 'static> {
    /// Cells of a row, relative to the row element.
    pub cells: &'static LazyLock<Selector>,
    /// Leading rows that carry captions rather than data.
    pub skip_rows: usize,
    pub columns: &'static [Column<T>],
    pub presence: fn(&T) -> &str,
}

impl<T: Default + 'static> RowLayout<T> {
    /// Builds one item from cell texts in document order, or `None` when the
    /// presence field comes out empty.
    pub fn build<S: AsRef<str>>(&self, cells: &[S]) -> Option<T> {
        let mut item = T::default();
        for column in self.columns {
            if let Some(raw) = cells.get(column.index) {
                (column.set)(&mut item, column.clean.apply(raw.as_ref()));
            }
        }
        if (self.presence)(&item).is_empty() {
            None
        } else {
            Some(item)
        }
    }
}

pub struct Section {
    /// Label for log fields.
    pub name: &'static str,
    pub container: &'static str,
}

pub const LAND_SECTION: Section = Section {
    name: "land",
    container: "#landDetails > table",
};

pub const ROLL_VALUE_SECTION: Section = Section {
    name: "roll_values",
    container: "#rollHistoryDetails > table",
};

pub const JURISDICTION_SECTION: Section = Section {
    name: "jurisdictions",
    container: "#taxingJurisdictionDetails > table.tableData",
};

pub const IMPROVEMENT_CONTAINER: &str = "#improvementBuildingDetails";
pub const IMPROVEMENT_TABLE_CLASS: &str = "improvements";
pub const IMPROVEMENT_DETAIL_TABLE_CLASS: &str = "improvementDetails";

fn land_presence(l: &Land) -> &str {
    &l.number
}

fn improvement_presence(i: &Improvement) -> &str {
    &i.name
}

fn detail_presence(d: &ImprovementDetail) -> &str {
    &d.description
}

fn roll_value_presence(r: &RollValue) -> &str {
    &r.year
}

fn jurisdiction_presence(j: &Jurisdiction) -> &str {
    &j.entity
}

pub static LAND_ROW: RowLayout<Land> = RowLayout {
    cells: &DATA_CELLS,
    skip_rows: 0,
    columns: &[
        Column { index: 0, clean: Clean::Trim, set: |l, v| l.number = v },
        Column { index: 1, clean: Clean::Trim, set: |l, v| l.land_type = v },
        Column { index: 2, clean: Clean::Trim, set: |l, v| l.description = v },
        Column { index: 3, clean: Clean::Trim, set: |l, v| l.acres = v },
        Column { index: 4, clean: Clean::Sqft, set: |l, v| l.sqft = v },
        Column { index: 5, clean: Clean::Trim, set: |l, v| l.eff_front = v },
        Column { index: 6, clean: Clean::Trim, set: |l, v| l.eff_depth = v },
        Column { index: 7, clean: Clean::Money, set: |l, v| l.market_value = v },
    ],
    presence: land_presence,
};

/// An improvement header table reads as one row: label and value cells
/// alternate, so values sit at odd positions past the name.
pub static IMPROVEMENT_ROW: RowLayout<Improvement> = RowLayout {
    cells: &ALL_CELLS,
    skip_rows: 0,
    columns: &[
        Column { index: 0, clean: Clean::Trim, set: |i, v| i.name = v },
        Column { index: 1, clean: Clean::Trim, set: |i, v| i.description = v },
        Column { index: 3, clean: Clean::Trim, set: |i, v| i.state_code = v },
        Column { index: 5, clean: Clean::Sqft, set: |i, v| i.living_area = v },
        Column { index: 7, clean: Clean::Money, set: |i, v| i.value = v },
    ],
    presence: improvement_presence,
};

pub static IMPROVEMENT_DETAIL_ROW: RowLayout<ImprovementDetail> = RowLayout {
    cells: &ALL_CELLS,
    skip_rows: 1,
    columns: &[
        Column { index: 1, clean: Clean::Trim, set: |d, v| d.detail_type = v },
        Column { index: 2, clean: Clean::Trim, set: |d, v| d.description = v },
        Column { index: 3, clean: Clean::Trim, set: |d, v| d.class = v },
        Column { index: 4, clean: Clean::Trim, set: |d, v| d.exterior_wall = v },
        Column { index: 5, clean: Clean::Trim, set: |d, v| d.year_built = v },
        Column { index: 6, clean: Clean::Sqft, set: |d, v| d.sqft = v },
    ],
    presence: detail_presence,
};

pub static ROLL_VALUE_ROW: RowLayout<RollValue> = RowLayout {
    cells: &DATA_CELLS,
    skip_rows: 0,
    columns: &[
        Column { index: 0, clean: Clean::Trim, set: |r, v| r.year = v },
        Column { index: 1, clean: Clean::Money, set: |r, v| r.improvements = v },
        Column { index: 2, clean: Clean::Money, set: |r, v| r.land_market = v },
        Column { index: 3, clean: Clean::Money, set: |r, v| r.ag_valuation = v },
        Column { index: 4, clean: Clean::Money, set: |r, v| r.appraised = v },
        Column { index: 5, clean: Clean::Money, set: |r, v| r.homestead_cap = v },
        Column { index: 6, clean: Clean::Money, set: |r, v| r.assessed = v },
    ],
    presence: roll_value_presence,
};

pub static JURISDICTION_ROW: RowLayout<Jurisdiction> = RowLayout {
    cells: &DATA_CELLS,
    skip_rows: 0,
    columns: &[
        Column { index: 0, clean: Clean::Trim, set: |j, v| j.entity = v },
        Column { index: 1, clean: Clean::Trim, set: |j, v| j.description = v },
        Column { index: 2, clean: Clean::Trim, set: |j, v| j.tax_rate = v },
        Column { index: 3, clean: Clean::Money, set: |j, v| j.appraised_value = v },
        Column { index: 4, clean: Clean::Money, set: |j, v| j.taxable_value = v },
        Column { index: 5, clean: Clean::Money, set: |j, v| j.estimated_tax = v },
    ],
    presence: jurisdiction_presence,
};
