use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    catalog::{self, Habitat},
    catch_table::{catch_value, SampledCatch},
    gear::{
        luck_bonus, Clothing, ClothingSlot, EquipSlot, Equipment, GearError, GearSnapshot, Item,
        ItemId, Lure, Rod, RodAction,
    },
    records::{RecordBook, RecordUpdate},
};

pub type PlayerId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaughtFish {
    pub species: String,
    pub weight: f32,
    pub length: f32,
    pub caught_at: DateTime<Utc>,
    /// Set when this capture beat a personal record.
    pub trophy: bool,
}

impl CaughtFish {
    pub fn value(&self) -> f32 {
        catalog::species(&self.species).map_or(0.0, |species| catch_value(species, self.weight))
    }
}

/// Resource changes a finished session applies to its owner.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub rod_id: ItemId,
    pub lure_id: ItemId,
    pub rod_wear: u32,
    pub lure_charges: u32,
    pub catch: Option<SampledCatch>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettlementReport {
    /// Rod durability after settling, if the rod was touched.
    pub rod_durability: Option<u32>,
    /// Lure uses left after settling, if the lure was touched.
    pub lure_uses: Option<u32>,
    pub caught: Option<CaughtFish>,
    pub records: RecordUpdate,
    pub tokens_awarded: u32,
}

/// An inventory entry. Its id stays put while other items come and go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Owned {
    id: ItemId,
    item: Item,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    items: Vec<Owned>,
    #[serde(default)]
    next_item_id: ItemId,
    pub equipment: Equipment,
    pub catches: Vec<CaughtFish>,
    pub records: RecordBook,
    /// FishMaster tokens.
    pub tokens: u32,
    pub fish_points: f32,
}

impl Player {
    pub fn new(id: PlayerId) -> Self {
        Self {
            id,
            items: Vec::new(),
            next_item_id: 0,
            equipment: Equipment::default(),
            catches: Vec::new(),
            records: RecordBook::default(),
            tokens: 0,
            fish_points: 0.0,
        }
    }

    pub fn with_starter_kit(id: PlayerId) -> Self {
        let mut player = Self::new(id);
        let kit = [
            Item::Rod(Rod {
                name: "Willow Rod".to_string(),
                durability: 20,
                max_durability: 20,
                power: 1.0,
                action: RodAction::Moderate,
                habitat: Habitat::Freshwater,
            }),
            Item::Lure(Lure {
                name: "Rooster Tail Spinner".to_string(),
                remaining_uses: 10,
                uses_per_item: 10,
                habitat: Habitat::Both,
                attraction: 1.0,
                biases: Vec::new(),
            }),
            Item::Clothing(Clothing {
                name: "Lucky Bucket Hat".to_string(),
                slot: ClothingSlot::Hat,
                luck: 5.0,
            }),
        ];

        for item in kit {
            let index = player.add_item(item);
            // kit items always fit their own slot
            let _ = player.equip(index);
        }

        player
    }

    pub fn add_item(&mut self, item: Item) -> usize {
        let id = self.next_item_id;
        self.next_item_id += 1;
        self.items.push(Owned { id, item });
        self.items.len() - 1
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().map(|owned| &owned.item)
    }

    pub fn item(&self, index: usize) -> Option<&Item> {
        self.items.get(index).map(|owned| &owned.item)
    }

    pub fn item_id(&self, index: usize) -> Option<ItemId> {
        self.items.get(index).map(|owned| owned.id)
    }

    /// Current inventory index of an item.
    pub fn position(&self, id: ItemId) -> Option<usize> {
        self.items.iter().position(|owned| owned.id == id)
    }

    /// Removes an item, shifting equipped indices that pointed past it.
    pub fn remove_item(&mut self, index: usize) -> Result<Item, GearError> {
        if index >= self.items.len() {
            return Err(GearError::NoSuchItem(index));
        }
        let item = self.items.remove(index).item;

        for slot in EquipSlot::ALL {
            let equipped = self.equipment.slot_mut(slot);
            *equipped = match *equipped {
                Some(i) if i == index => None,
                Some(i) if i > index => Some(i - 1),
                other => other,
            };
        }

        Ok(item)
    }

    pub fn equip(&mut self, index: usize) -> Result<EquipSlot, GearError> {
        let slot = self.item(index).ok_or(GearError::NoSuchItem(index))?.slot();
        *self.equipment.slot_mut(slot) = Some(index);
        Ok(slot)
    }

    pub fn equip_as(&mut self, index: usize, slot: EquipSlot) -> Result<(), GearError> {
        let item = self.item(index).ok_or(GearError::NoSuchItem(index))?;
        if !item.fits(slot) {
            return Err(GearError::WrongSlot(index, slot));
        }
        *self.equipment.slot_mut(slot) = Some(index);
        Ok(())
    }

    pub fn unequip(&mut self, slot: EquipSlot) -> Result<usize, GearError> {
        self.equipment
            .slot_mut(slot)
            .take()
            .ok_or(GearError::NothingEquipped(slot))
    }

    /// Resolves an equipped index, ignoring it if it no longer points at a fitting item.
    fn equipped(&self, slot: EquipSlot) -> Option<(usize, &Item)> {
        let index = self.equipment.get(slot)?;
        self.item(index)
            .filter(|item| item.fits(slot))
            .map(|item| (index, item))
    }

    pub fn equipped_rod(&self) -> Option<(usize, &Rod)> {
        match self.equipped(EquipSlot::Rod)? {
            (index, Item::Rod(rod)) => Some((index, rod)),
            _ => None,
        }
    }

    pub fn equipped_lure(&self) -> Option<(usize, &Lure)> {
        match self.equipped(EquipSlot::Lure)? {
            (index, Item::Lure(lure)) => Some((index, lure)),
            _ => None,
        }
    }

    pub fn equipped_clothing(&self, slot: EquipSlot) -> Option<&Clothing> {
        match self.equipped(slot)? {
            (_, Item::Clothing(clothing)) => Some(clothing),
            _ => None,
        }
    }

    pub fn luck_bonus(&self) -> f32 {
        luck_bonus(
            self.equipped_clothing(EquipSlot::Hat),
            self.equipped_clothing(EquipSlot::Coat),
            self.equipped_clothing(EquipSlot::Boots),
        )
    }

    /// Snapshot of the equipped rod and lure, without judging whether they are usable.
    pub fn gear_snapshot(&self) -> Option<GearSnapshot> {
        let (rod_index, rod) = self.equipped_rod()?;
        let (lure_index, lure) = self.equipped_lure()?;

        Some(GearSnapshot {
            rod_id: self.item_id(rod_index)?,
            rod: rod.clone(),
            lure_id: self.item_id(lure_index)?,
            lure: lure.clone(),
            luck_bonus: self.luck_bonus(),
        })
    }

    pub fn rod_mut(&mut self, index: usize) -> Option<&mut Rod> {
        match &mut self.items.get_mut(index)?.item {
            Item::Rod(rod) => Some(rod),
            _ => None,
        }
    }

    pub fn lure_mut(&mut self, index: usize) -> Option<&mut Lure> {
        match &mut self.items.get_mut(index)?.item {
            Item::Lure(lure) => Some(lure),
            _ => None,
        }
    }

    pub fn repair_rod(&mut self, index: usize) -> Result<u32, GearError> {
        let rod = self
            .rod_mut(index)
            .ok_or(GearError::WrongSlot(index, EquipSlot::Rod))?;
        rod.repair();
        Ok(rod.durability)
    }

    pub fn restock_lure(&mut self, index: usize, items: u32) -> Result<u32, GearError> {
        let lure = self
            .lure_mut(index)
            .ok_or(GearError::WrongSlot(index, EquipSlot::Lure))?;
        lure.restock(items);
        Ok(lure.remaining_uses)
    }

    /// Applies a finished session's resource changes.
    ///
    /// Gear is found by the ids captured at cast time, wherever it sits now.
    /// Gear that has left the inventory is skipped.
    pub fn settle(
        &mut self,
        settlement: &Settlement,
        at: DateTime<Utc>,
        tokens_per_record: u32,
    ) -> SettlementReport {
        let mut report = SettlementReport::default();

        if settlement.rod_wear > 0 {
            let rod = self
                .position(settlement.rod_id)
                .and_then(|index| self.rod_mut(index));
            match rod {
                Some(rod) => {
                    rod.damage(settlement.rod_wear);
                    report.rod_durability = Some(rod.durability);
                }
                None => warn!(
                    "Player {} no longer holds rod #{}",
                    self.id, settlement.rod_id
                ),
            }
        }

        if settlement.lure_charges > 0 {
            let lure = self
                .position(settlement.lure_id)
                .and_then(|index| self.lure_mut(index));
            match lure {
                Some(lure) => {
                    lure.consume(settlement.lure_charges);
                    report.lure_uses = Some(lure.remaining_uses);
                }
                None => warn!(
                    "Player {} no longer holds lure #{}",
                    self.id, settlement.lure_id
                ),
            }
        }

        if let Some(catch) = &settlement.catch {
            let records = self
                .records
                .update(catch.species.id, catch.weight, catch.length, at);
            let fish = CaughtFish {
                species: catch.species.id.to_string(),
                weight: catch.weight,
                length: catch.length,
                caught_at: at,
                trophy: records.any(),
            };

            report.tokens_awarded = records.tokens(tokens_per_record);
            self.tokens += report.tokens_awarded;
            self.catches.push(fish.clone());
            report.records = records;
            report.caught = Some(fish);
        }

        report
    }

    /// Sells every held fish and returns the FishPoints earned.
    pub fn sell_catches(&mut self) -> f32 {
        let earned = self.catches.drain(..).map(|fish| fish.value()).sum::<f32>();
        self.fish_points += earned;
        debug!("Player {} sold their catch for {earned:.2}", self.id);
        earned
    }

    pub fn best_catch(&self) -> Option<&CaughtFish> {
        self.catches
            .iter()
            .max_by(|a, b| a.value().total_cmp(&b.value()))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    use super::*;
    use crate::gear::tests::{clothing, lure, rod};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 4, 9, 30, 0).unwrap()
    }

    fn angler() -> Player {
        let mut player = Player::new(1);
        player.add_item(Item::Rod(rod(5)));
        player.add_item(Item::Clothing(clothing(ClothingSlot::Coat, 3.0)));
        player.add_item(Item::Lure(lure(4)));
        player.equip(0).unwrap();
        player.equip(1).unwrap();
        player.equip(2).unwrap();
        player
    }

    fn walleye(weight: f32) -> SampledCatch {
        SampledCatch {
            species: catalog::species("walleye").unwrap(),
            weight,
            length: 50.0,
        }
    }

    #[test]
    fn starter_kit_is_ready_to_fish() {
        let player = Player::with_starter_kit(9);
        let gear = player.gear_snapshot().unwrap();

        assert!(!gear.rod.is_broken());
        assert!(!gear.lure.is_empty());
        assert_relative_eq!(gear.luck_bonus, 5.0);
    }

    #[test]
    fn equip_as_rejects_wrong_slot() {
        let mut player = angler();

        assert_eq!(
            player.equip_as(0, EquipSlot::Lure),
            Err(GearError::WrongSlot(0, EquipSlot::Lure))
        );
        assert_eq!(player.equip(7), Err(GearError::NoSuchItem(7)));
    }

    #[test]
    fn unequip_clears_the_slot() {
        let mut player = angler();

        assert_eq!(player.unequip(EquipSlot::Coat), Ok(1));
        assert_eq!(
            player.unequip(EquipSlot::Coat),
            Err(GearError::NothingEquipped(EquipSlot::Coat))
        );
        assert_relative_eq!(player.luck_bonus(), 0.0);
    }

    #[test]
    fn removing_an_item_reindexes_equipment() {
        let mut player = angler();

        let removed = player.remove_item(1).unwrap();

        assert!(matches!(removed, Item::Clothing(_)));
        assert_eq!(player.equipment.coat, None);
        assert_eq!(player.equipment.rod, Some(0));
        assert_eq!(player.equipment.lure, Some(1));
        assert_eq!(player.equipped_lure().map(|(i, _)| i), Some(1));
    }

    #[test]
    fn stale_indices_are_ignored() {
        let mut player = angler();
        player.equipment.rod = Some(42);
        player.equipment.hat = Some(0);

        assert!(player.equipped_rod().is_none());
        assert!(player.equipped_clothing(EquipSlot::Hat).is_none());
        assert!(player.gear_snapshot().is_none());
    }

    #[test]
    fn landing_settles_lure_catch_and_records() {
        let mut player = angler();
        let landed = |weight| Settlement {
            rod_id: 0,
            lure_id: 2,
            rod_wear: 0,
            lure_charges: 1,
            catch: Some(walleye(weight)),
        };

        let first = player.settle(&landed(2.0), at(), 1);
        let second = player.settle(&landed(3.0), at(), 1);

        assert_eq!(first.lure_uses, Some(3));
        assert_eq!(first.rod_durability, None);
        assert!(!first.caught.unwrap().trophy);
        assert!(second.records.new_weight_record);
        assert!(second.caught.unwrap().trophy);
        assert_eq!(second.tokens_awarded, 1);
        assert_eq!(player.tokens, 1);
        assert_eq!(player.catches.len(), 2);
        assert_eq!(player.equipped_lure().unwrap().1.remaining_uses, 2);
    }

    #[test]
    fn snapping_wears_the_rod() {
        let mut player = angler();
        let snapped = Settlement {
            rod_id: 0,
            lure_id: 2,
            rod_wear: 1,
            lure_charges: 1,
            catch: None,
        };

        let report = player.settle(&snapped, at(), 1);

        assert_eq!(report.rod_durability, Some(4));
        assert!(report.caught.is_none());
        assert!(player.catches.is_empty());
    }

    #[test]
    fn settling_follows_gear_that_moved() {
        let mut player = angler();
        let spare = player.add_item(Item::Lure(lure(7)));
        let gear = player.gear_snapshot().unwrap();

        // the coat is sold while the line is out
        player.remove_item(1).unwrap();

        let report = player.settle(
            &Settlement {
                rod_id: gear.rod_id,
                lure_id: gear.lure_id,
                rod_wear: 1,
                lure_charges: 1,
                catch: None,
            },
            at(),
            1,
        );

        assert_eq!(report.rod_durability, Some(4));
        assert_eq!(report.lure_uses, Some(3));
        assert_eq!(player.equipped_lure().unwrap().1.remaining_uses, 3);
        assert!(matches!(player.item(spare - 1), Some(Item::Lure(l)) if l.remaining_uses == 7));
    }

    #[test]
    fn settling_against_removed_gear_changes_nothing() {
        let mut player = angler();
        let gear = player.gear_snapshot().unwrap();
        player.remove_item(2).unwrap();
        player.add_item(Item::Lure(lure(7)));
        let before = player.clone();

        let report = player.settle(
            &Settlement {
                rod_id: gear.rod_id,
                lure_id: gear.lure_id,
                rod_wear: 0,
                lure_charges: 1,
                catch: None,
            },
            at(),
            1,
        );

        assert_eq!(report, SettlementReport::default());
        assert_eq!(player, before);
    }

    #[test]
    fn item_ids_are_never_reused() {
        let mut player = angler();
        let last = player.item_id(2).unwrap();

        player.remove_item(2).unwrap();
        let index = player.add_item(Item::Lure(lure(1)));

        assert_eq!(player.item_id(index), Some(last + 1));
        assert_eq!(player.position(last), None);
    }

    #[test]
    fn selling_converts_catches_to_points() {
        let mut player = angler();
        player.settle(
            &Settlement {
                rod_id: 0,
                lure_id: 2,
                rod_wear: 0,
                lure_charges: 1,
                catch: Some(walleye(5.5)),
            },
            at(),
            1,
        );
        let expected = player.catches[0].value();

        assert_eq!(player.best_catch().map(|f| f.species.as_str()), Some("walleye"));
        assert_relative_eq!(player.sell_catches(), expected);
        assert!(player.catches.is_empty());
        assert_relative_eq!(player.fish_points, expected);
    }

    #[test]
    fn repairs_and_restocks_by_index() {
        let mut player = angler();
        player.rod_mut(0).unwrap().damage(5);

        assert_eq!(player.repair_rod(0), Ok(10));
        assert_eq!(player.restock_lure(2, 2), Ok(14));
        assert_eq!(
            player.repair_rod(2),
            Err(GearError::WrongSlot(2, EquipSlot::Rod))
        );
    }
}
