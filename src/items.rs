//! Item CRUD.
//!
//! Listing and lookup are public. The HTTP layer resolves an identity before
//! calling [`create`], [`update`] or [`delete`]; there is no ownership check, so
//! any authenticated user may change any item.

use tracing::{info, instrument};

use crate::{
    error::{Error, Result},
    store::{Item, ItemFields, ItemFilter, ItemRepository},
};

pub const NAME_MAX_LENGTH: usize = 100;
pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

fn validate(name: &str, description: Option<String>) -> Result<ItemFields> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::field("name", "Name must not be empty."));
    }
    if name.chars().count() > NAME_MAX_LENGTH {
        return Err(Error::field("name", "Name must be at most 100 characters."));
    }
    Ok(ItemFields {
        name: name.to_string(),
        description,
    })
}

/// Build a listing filter; blank queries mean "no filter" and `limit` is capped.
#[must_use]
pub fn filter(q: Option<String>, limit: Option<i64>, offset: Option<i64>) -> ItemFilter {
    ItemFilter {
        q: q.filter(|q| !q.trim().is_empty()),
        limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(0, MAX_LIMIT),
        offset: offset.unwrap_or(0).max(0),
    }
}

/// # Errors
/// [`Error::Validation`] if the name is blank or too long.
#[instrument(skip(items, description))]
pub async fn create(
    items: &dyn ItemRepository,
    name: &str,
    description: Option<String>,
) -> Result<Item> {
    let fields = validate(name, description)?;
    let item = items.create(&fields).await?;
    info!(item_id = item.id, "item created");
    Ok(item)
}

/// # Errors
/// Storage failures only.
pub async fn list(items: &dyn ItemRepository, filter: &ItemFilter) -> Result<Vec<Item>> {
    Ok(items.list(filter).await?)
}

/// # Errors
/// [`Error::NotFound`] if no item has this id.
pub async fn get(items: &dyn ItemRepository, id: i64) -> Result<Item> {
    items.get(id).await?.ok_or(Error::NotFound("Item"))
}

/// Replace name and description.
///
/// # Errors
/// [`Error::Validation`] for a bad name, [`Error::NotFound`] if the item is gone.
#[instrument(skip(items, description))]
pub async fn update(
    items: &dyn ItemRepository,
    id: i64,
    name: &str,
    description: Option<String>,
) -> Result<Item> {
    let fields = validate(name, description)?;
    items.update(id, &fields).await?.ok_or(Error::NotFound("Item"))
}

/// # Errors
/// [`Error::NotFound`] if no item has this id.
#[instrument(skip(items))]
pub async fn delete(items: &dyn ItemRepository, id: i64) -> Result<()> {
    if items.delete(id).await? {
        info!("item deleted");
        Ok(())
    } else {
        Err(Error::NotFound("Item"))
    }
}
