/// Maps a Rust struct onto a table: the column set a repository is allowed
/// to read/write and the name of its primary key column.
///
/// Implemented by the `#[entity]` macro; hand-written impls are equally
/// valid for types that don't want the derive.
pub trait Entity: Send + Sync + Sized + 'static {
    /// The Rust type of the primary key.
    type Id: Send + Sync + Clone + 'static;

    /// The backing table name.
    fn table_name() -> &'static str;

    /// The primary key column name.
    fn id_column() -> &'static str {
        "id"
    }

    /// All columns this entity reads/writes, in a stable order.
    fn columns() -> &'static [&'static str];

    /// The column used for soft-delete tombstoning, if the entity opts in.
    ///
    /// `None` means deletes are hard deletes; generated reads never add a
    /// `deleted_at IS NULL` predicate for such entities.
    fn deleted_at_column() -> Option<&'static str> {
        None
    }

    /// This instance's primary key value.
    fn id(&self) -> Self::Id;

    /// Returns `self` with its primary key replaced. Used where a caller
    /// supplies the id out of band (e.g. the path segment of a `PUT`) and
    /// the body must not be trusted to carry a matching one.
    fn with_id(self, id: Self::Id) -> Self;

    /// The record `AppBuilder::with_entity` files into the startup scanner
    /// table in place of the runtime reflection a JVM framework would use.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}
