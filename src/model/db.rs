use chrono::{DateTime, Utc};

use crate::model::models::{CityDetailType, CountyDetailType, PostalCodeDetailType, UserDetailType};

/**
 * Database response type for a county: id, name, created_at, updated_at.
 */
pub type CountyDbResp = (i64, String, DateTime<Utc>, DateTime<Utc>);

/**
 * Database response type for a city joined with its county.
 */
pub type CityDbResp = (i64, String, DateTime<Utc>, DateTime<Utc>, i64, String, DateTime<Utc>, DateTime<Utc>);

/**
 * Database response type for a postal code joined with its city and county.
 */
pub type PostalCodeDbResp = (i64, String, DateTime<Utc>, DateTime<Utc>, i64, String, DateTime<Utc>, DateTime<Utc>, i64, String, DateTime<Utc>, DateTime<Utc>);

/**
 * Database response type for a user: id, name, email, created_at, updated_at.
 */
pub type UserDbResp = (i64, String, String, DateTime<Utc>, DateTime<Utc>);

/**
 * Database response type for a user including the password hash.
 */
pub type UserCredentialsDbResp = (i64, String, String, String, DateTime<Utc>, DateTime<Utc>);

impl From<CountyDbResp> for CountyDetailType {
    fn from(row: CountyDbResp) -> Self {
        CountyDetailType { id: row.0, name: row.1, created_at: row.2, updated_at: row.3 }
    }
}

impl From<CityDbResp> for CityDetailType {
    fn from(row: CityDbResp) -> Self {
        CityDetailType {
            id: row.0,
            name: row.1,
            created_at: row.2,
            updated_at: row.3,
            county: CountyDetailType { id: row.4, name: row.5, created_at: row.6, updated_at: row.7 },
        }
    }
}

impl From<PostalCodeDbResp> for PostalCodeDetailType {
    fn from(row: PostalCodeDbResp) -> Self {
        PostalCodeDetailType {
            id: row.0,
            code: row.1,
            created_at: row.2,
            updated_at: row.3,
            city: CityDetailType {
                id: row.4,
                name: row.5,
                created_at: row.6,
                updated_at: row.7,
                county: CountyDetailType { id: row.8, name: row.9, created_at: row.10, updated_at: row.11 },
            },
        }
    }
}

impl From<UserDbResp> for UserDetailType {
    fn from(row: UserDbResp) -> Self {
        UserDetailType { id: row.0, name: row.1, email: row.2, created_at: row.3, updated_at: row.4 }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_postal_code_row_conversion() {
        let now = Utc::now();
        let row: PostalCodeDbResp = (3, "7621".to_string(), now, now, 2, "Pécs".to_string(), now, now, 1, "Baranya".to_string(), now, now);
        let postal_code = PostalCodeDetailType::from(row);
        assert_eq!(postal_code.code, "7621");
        assert_eq!(postal_code.city.id, 2);
        assert_eq!(postal_code.city.name, "Pécs");
        assert_eq!(postal_code.city.county.id, 1);
        assert_eq!(postal_code.city.county.name, "Baranya");
    }
}
