/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// Tenants are rows in the platform's tenant table.
pub type TenantId = DbId;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
