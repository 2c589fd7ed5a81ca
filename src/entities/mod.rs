// Entity Models - administrative units, SIMC settlements, map places
//
// Each entity lives in an arena owned by its registry or catalog and is
// referred to by a copyable id; links between entities are ids, never
// references.

pub mod admin;
pub mod place;
pub mod settlement;

pub use admin::{
    AdminRegistry, County, CountyId, Municipality, MunicipalityId, Province, ProvinceId,
};
pub use place::{AssignError, Hierarchy, LoadStats, MapPlace, PlaceCatalog, PlaceId};
pub use settlement::{KindTable, Settlement, SettlementCatalog, SettlementId};
