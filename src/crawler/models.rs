/// One property's tax record as laid out on the detail page.
///
/// Cell text is kept as cleaned strings; conversion to column types happens
/// at the storage boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyRecord {
    pub property_id: i32,
    pub page_property_id: String,
    pub owner_id: String,
    pub owner_name: String,
    pub owner_mailing_address: String,
    pub zoning: String,
    pub neighborhood_code: String,
    pub neighborhood: String,
    pub address: String,
    pub legal_description: String,
    pub geographic_id: String,
    pub exemptions: String,
    pub ownership_percentage: String,
    pub mapsco_id: String,
    pub land: Vec<Land>,
    pub improvements: Vec<Improvement>,
    pub roll_values: Vec<RollValue>,
    pub jurisdictions: Vec<Jurisdiction>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Land {
    pub number: String,
    pub land_type: String,
    pub description: String,
    pub acres: String,
    pub sqft: String,
    pub eff_front: String,
    pub eff_depth: String,
    pub market_value: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Improvement {
    pub name: String,
    pub description: String,
    pub state_code: String,
    pub living_area: String,
    pub value: String,
    pub details: Vec<ImprovementDetail>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImprovementDetail {
    pub detail_type: String,
    pub description: String,
    pub class: String,
    pub exterior_wall: String,
    pub year_built: String,
    pub sqft: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollValue {
    pub year: String,
    pub improvements: String,
    pub land_market: String,
    pub ag_valuation: String,
    pub appraised: String,
    pub homestead_cap: String,
    pub assessed: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Jurisdiction {
    pub entity: String,
    pub description: String,
    pub tax_rate: String,
    pub appraised_value: String,
    pub taxable_value: String,
    pub estimated_tax: String,
}
