use crate::schema::kv_entries;
use diesel::prelude::*;

#[derive(Queryable, Identifiable, Selectable)]
#[diesel(table_name = crate::schema::kv_entries)]
#[diesel(primary_key(key))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct KvEntry {
    pub key: String,
    pub value: String,
}

#[derive(Insertable)]
#[diesel(table_name = kv_entries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewKvEntry<'a> {
    pub key: &'a str,
    pub value: &'a str,
}
