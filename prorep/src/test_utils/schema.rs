use crate::schema::SchemaMap;

/// DDL artifact describing a `customer` table and an `order` table.
///
/// `customer` maps `name` to `cust_name`, the two-element extent `phones` to `cust_phones` and
/// keeps `balance` as a decimal with two digits. `order` is renamed to `order_` on the target.
pub const CUSTOMER_ARTIFACT: &str = r#"{
    "tables": [
        {
            "name": ["customer", "customer"],
            "columns": [
                {"name": ["name", "cust_name"], "type": "character", "max-width": "60"},
                {"name": ["phones", "cust_phones"], "type": "character", "extent": "2"},
                {"name": ["balance", "balance"], "type": "decimal", "decimals": "2"},
                {"name": ["active", "active"], "type": "logical"},
                {"name": ["since", "since"], "type": "date"}
            ]
        },
        {
            "name": ["order", "order_"],
            "columns": [
                {"name": ["total", "total"], "type": "decimal"},
                {"name": ["placed", "placed"], "type": "datetime-tz"}
            ]
        }
    ],
    "indexes": [
        {
            "index_name": ["cust-name", "cust_name_idx"],
            "table_name": ["customer", "customer"],
            "index_details": {"columns": [["name", "cust_name"]]}
        }
    ],
    "config": {
        "rdbms": "postgresql",
        "dbhost": "localhost",
        "dbport": 5432,
        "dbuser": "replicator",
        "dbpass": "secret",
        "dbname": "sports"
    }
}"#;

/// Returns the schema map built from [`CUSTOMER_ARTIFACT`].
pub fn customer_schema() -> SchemaMap {
    SchemaMap::parse(CUSTOMER_ARTIFACT).expect("customer artifact is valid")
}
