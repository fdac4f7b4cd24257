//! State-changing flows: register, transfer, photo proof, memorialize and
//! adoption listing. Each validates its inputs locally, uploads a photo if
//! needed, then submits exactly one transaction.

use crate::abi::Address;
use crate::contract::{RegistryCall, RegistryWriter};
use crate::error::{Error, Result};
use crate::record::PlantView;
use crate::upload::PhotoStore;
use log::info;
use std::path::Path;

pub struct Steward<'a, W, P> {
    writer: &'a W,
    photos: &'a P,
    account: Option<Address>,
}

impl<'a, W: RegistryWriter, P: PhotoStore> Steward<'a, W, P> {
    pub fn new(writer: &'a W, photos: &'a P, account: Option<Address>) -> Self {
        Self {
            writer,
            photos,
            account,
        }
    }

    fn account(&self) -> Result<&Address> {
        self.account
            .as_ref()
            .ok_or_else(|| Error::Precondition("Please connect your wallet".into()))
    }

    async fn pin_photo(&self, photo: Option<&Path>, missing: &str) -> Result<String> {
        let photo = photo.ok_or_else(|| Error::Precondition(missing.into()))?;
        let cid = self.photos.pin(photo).await?;
        if cid.is_empty() {
            return Err(Error::Upload("No CID returned from upload".into()));
        }
        info!("Photo pinned as {}", cid);
        Ok(cid)
    }

    async fn submit(&self, call: RegistryCall) -> Result<String> {
        let from = self.account()?;
        info!("Submitting {} from {}", call.signature(), from);
        self.writer.submit(from, &call).await
    }

    pub async fn register_plant(
        &self,
        species: &str,
        name: &str,
        photo: Option<&Path>,
    ) -> Result<String> {
        self.account()?;
        if species.trim().is_empty() || name.trim().is_empty() {
            return Err(Error::Precondition("Please enter a species and a name".into()));
        }
        let photo_cid = self
            .pin_photo(photo, "Please upload a photo of your plant")
            .await?;
        self.submit(RegistryCall::RegisterPlant {
            species: species.trim().to_string(),
            name: name.trim().to_string(),
            photo_cid,
        })
        .await
    }

    pub async fn transfer_stewardship(&self, plant: &PlantView, recipient: &str) -> Result<String> {
        ensure_can_act(plant)?;
        let new_steward = Address::parse(recipient.trim())?;
        if new_steward == Address::zero() {
            return Err(Error::Precondition("Cannot transfer to the zero address".into()));
        }
        self.submit(RegistryCall::TransferStewardship {
            id: plant.record.id,
            new_steward,
        })
        .await
    }

    pub async fn photo_proof(&self, plant: &PlantView, photo: Option<&Path>) -> Result<String> {
        self.account()?;
        ensure_can_act(plant)?;
        let photo_cid = self.pin_photo(photo, "Please select a photo").await?;
        self.submit(RegistryCall::PhotoProof {
            id: plant.record.id,
            photo_cid,
        })
        .await
    }

    /// Irreversible, so the caller has to confirm explicitly.
    pub async fn memorialize(&self, plant: &PlantView, confirmed: bool) -> Result<String> {
        ensure_can_act(plant)?;
        if !confirmed {
            return Err(Error::Precondition(
                "Memorializing a plant is permanent; confirm to continue".into(),
            ));
        }
        self.submit(RegistryCall::MemorializePlant {
            id: plant.record.id,
        })
        .await
    }

    pub async fn list_for_adoption(&self, plant: &PlantView, location: &str) -> Result<String> {
        ensure_can_act(plant)?;
        let location = location.trim();
        if location.is_empty() {
            return Err(Error::Precondition("Please enter a location".into()));
        }
        self.submit(RegistryCall::ListForAdoption {
            id: plant.record.id,
            location: location.to_string(),
        })
        .await
    }
}

fn ensure_can_act(plant: &PlantView) -> Result<()> {
    if plant.record.is_memorialized {
        return Err(Error::Precondition(format!(
            "Plant {} is memorialized and can no longer change",
            plant.record.id
        )));
    }
    if !plant.status.is_owner {
        return Err(Error::Precondition(format!(
            "Only the current steward ({}) can do this",
            plant.record.current_steward
        )));
    }
    Ok(())
}
