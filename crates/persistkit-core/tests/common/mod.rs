#![allow(dead_code)]

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use persistkit_core::codec::{Entity, SnapshotBuilder, SnapshotReader};
use persistkit_core::contract::{reject_unsupported_query, DataStore};
use persistkit_core::errors::{Result, StoreError};
use persistkit_core::identity::IdentifierAuthority;
use persistkit_core::model::{
    AttributeKind, EntitySchema, FetchRequest, FetchResult, PersistentIdentifier, SaveRequest,
    SaveResult, Schema, Snapshot,
};

/// In-memory store that follows the contract without touching disk
pub struct ListStore {
    authority: IdentifierAuthority,
    rows: Vec<Snapshot>,
}

impl ListStore {
    pub fn new(identifier: &str) -> Self {
        Self {
            authority: IdentifierAuthority::new(identifier),
            rows: Vec::new(),
        }
    }
}

impl DataStore for ListStore {
    fn identifier(&self) -> &str {
        self.authority.store_identifier()
    }

    fn save(&mut self, request: SaveRequest) -> Result<SaveResult> {
        request.validate()?;
        let mut remapped = HashMap::new();
        for snapshot in &request.inserted {
            let temporary = snapshot.persistent_identifier();
            let rows = &self.rows;
            let permanent = self.authority.mint_for(temporary, |candidate| {
                rows.iter().any(|r| r.persistent_identifier() == candidate)
            })?;
            self.rows.push(snapshot.copy_with_identifier(permanent.clone()));
            remapped.insert(temporary.clone(), permanent);
        }
        let deleted: Vec<PersistentIdentifier> = request
            .deleted
            .iter()
            .map(|s| s.persistent_identifier().clone())
            .collect();
        self.rows
            .retain(|r| !deleted.contains(r.persistent_identifier()));
        self.authority.commit(&remapped);
        Ok(SaveResult {
            store_identifier: self.identifier().to_string(),
            remapped_identifiers: remapped,
            deleted_identifiers: deleted,
        })
    }

    fn fetch(&self, request: &FetchRequest) -> Result<FetchResult> {
        reject_unsupported_query(request)?;
        Ok(FetchResult {
            fetched_snapshots: self
                .rows
                .iter()
                .filter(|s| request.selects(s))
                .cloned()
                .collect(),
            related_snapshots: self
                .rows
                .iter()
                .map(|s| (s.persistent_identifier().clone(), s.clone()))
                .collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trip {
    pub name: String,
    pub destination: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub living_accommodation: Option<PersistentIdentifier>,
    pub bucket_list: Vec<PersistentIdentifier>,
}

impl Entity for Trip {
    fn schema() -> EntitySchema {
        EntitySchema::new("Trip", "trips")
            .attribute("name", AttributeKind::String)
            .attribute("destination", AttributeKind::String)
            .attribute("startDate", AttributeKind::Date)
            .attribute("endDate", AttributeKind::Date)
            .to_one("livingAccommodation", "LivingAccommodation")
            .to_many("bucketList", "BucketListItem")
    }

    fn encode(&self, builder: &mut SnapshotBuilder) {
        builder
            .set("name", &self.name)
            .set("destination", &self.destination)
            .set_date("startDate", &self.start_date)
            .set_date("endDate", &self.end_date)
            .to_one("livingAccommodation", self.living_accommodation.as_ref())
            .to_many("bucketList", &self.bucket_list);
    }

    fn decode(reader: &SnapshotReader<'_>) -> std::result::Result<Self, StoreError> {
        Ok(Self {
            name: reader.get("name")?,
            destination: reader.get("destination")?,
            start_date: reader.date("startDate")?,
            end_date: reader.date("endDate")?,
            living_accommodation: reader.to_one("livingAccommodation")?.into_option(),
            bucket_list: reader.to_many("bucketList")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LivingAccommodation {
    pub place_name: String,
    pub address: String,
    pub is_confirmed: bool,
    pub trip: Option<PersistentIdentifier>,
}

impl Entity for LivingAccommodation {
    fn schema() -> EntitySchema {
        EntitySchema::new("LivingAccommodation", "livingAccommodation")
            .attribute("placeName", AttributeKind::String)
            .attribute("address", AttributeKind::String)
            .attribute("isConfirmed", AttributeKind::Bool)
            .to_one("trip", "Trip")
    }

    fn encode(&self, builder: &mut SnapshotBuilder) {
        builder
            .set("placeName", &self.place_name)
            .set("address", &self.address)
            .set("isConfirmed", &self.is_confirmed)
            .to_one("trip", self.trip.as_ref());
    }

    fn decode(reader: &SnapshotReader<'_>) -> std::result::Result<Self, StoreError> {
        Ok(Self {
            place_name: reader.get("placeName")?,
            address: reader.get("address")?,
            is_confirmed: reader.get("isConfirmed")?,
            trip: reader.to_one("trip")?.into_option(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BucketListItem {
    pub title: String,
    pub details: String,
    pub has_reservation: bool,
    pub is_in_plan: bool,
    pub trip: Option<PersistentIdentifier>,
}

impl Entity for BucketListItem {
    fn schema() -> EntitySchema {
        EntitySchema::new("BucketListItem", "bucketList")
            .attribute("title", AttributeKind::String)
            .attribute("details", AttributeKind::String)
            .attribute("hasReservation", AttributeKind::Bool)
            .attribute("isInPlan", AttributeKind::Bool)
            .to_one("trip", "Trip")
    }

    fn encode(&self, builder: &mut SnapshotBuilder) {
        builder
            .set("title", &self.title)
            .set("details", &self.details)
            .set("hasReservation", &self.has_reservation)
            .set("isInPlan", &self.is_in_plan)
            .to_one("trip", self.trip.as_ref());
    }

    fn decode(reader: &SnapshotReader<'_>) -> std::result::Result<Self, StoreError> {
        Ok(Self {
            title: reader.get("title")?,
            details: reader.get("details")?,
            has_reservation: reader.get("hasReservation")?,
            is_in_plan: reader.get("isInPlan")?,
            trip: reader.to_one("trip")?.into_option(),
        })
    }
}

pub fn travel_schema() -> Schema {
    Schema::new(vec![
        Trip::schema(),
        LivingAccommodation::schema(),
        BucketListItem::schema(),
    ])
}
