pub mod time;

/// Short random id used to salt request identifiers per connection.
pub fn shortid() -> String {
    nanoid::nanoid!(8)
}
