use std::collections::HashMap;

use crate::{import::store::ImportStore, model::apperror::ApplicationError};

/**
 * Outcome of resolving a natural key to an id.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub id: i64,
    /**
     * true if the row was inserted while resolving.
     */
    pub created: bool,
}

/**
 * Natural key to id mapping for counties and cities, owned by a single import run.
 *
 * Counties are keyed by name and seeded from storage. Cities are keyed by
 * (city name, county name) and filled on first use.
 */
#[derive(Debug, Default)]
pub struct LookupCache {
    counties: HashMap<String, i64>,
    cities: HashMap<(String, String), i64>,
    county_lookups: u64,
    city_lookups: u64,
}

impl LookupCache {
    /**
     * Creates a cache seeded with every known county.
     */
    pub fn new(counties: HashMap<String, i64>) -> Self {
        LookupCache { counties, ..LookupCache::default() }
    }

    /**
     * Resolves a county by name, creating it in storage on a cache miss.
     */
    pub async fn resolve_county<S: ImportStore>(&mut self, store: &mut S, county_name: &str) -> Result<Resolved, ApplicationError> {
        if let Some(id) = self.counties.get(county_name) {
            return Ok(Resolved { id: *id, created: false });
        }
        self.county_lookups += 1;
        let (id, created) = store.first_or_create_county(county_name).await?;
        self.counties.insert(county_name.to_string(), id);
        Ok(Resolved { id, created })
    }

    /**
     * Resolves a city by name within an already resolved county, creating it in storage on a cache miss.
     */
    pub async fn resolve_city<S: ImportStore>(&mut self, store: &mut S, city_name: &str, county_name: &str, county_id: i64) -> Result<Resolved, ApplicationError> {
        let key = (city_name.to_string(), county_name.to_string());
        if let Some(id) = self.cities.get(&key) {
            return Ok(Resolved { id: *id, created: false });
        }
        self.city_lookups += 1;
        let (id, created) = store.first_or_create_city(city_name, county_id).await?;
        self.cities.insert(key, id);
        Ok(Resolved { id, created })
    }

    /**
     * Number of storage round trips made for counties and cities.
     */
    pub fn storage_lookups(&self) -> (u64, u64) {
        (self.county_lookups, self.city_lookups)
    }
}
