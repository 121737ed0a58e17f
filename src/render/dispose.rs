//! Uniform release of GPU-side resources owned by scene nodes.
//!
//! Every node that owns assets carries [`OwnedAssets`]; teardown and removal
//! only ever talk to the [`Dispose`] trait, whatever the node kind.

use bevy::prelude::*;
use error_stack::Report;

use crate::{Result, TaskscapeError};

/// Allocation and release counts for one batch of asset work.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AssetTally {
    pub meshes_allocated: u64,
    pub meshes_released: u64,
    pub materials_allocated: u64,
    pub materials_released: u64,
}

impl AssetTally {
    pub fn allocations(&self) -> u64 {
        self.meshes_allocated + self.materials_allocated
    }

    pub fn releases(&self) -> u64 {
        self.meshes_released + self.materials_released
    }
}

/// Mutable access to the asset stores the board allocates from, counting
/// every allocation and release that goes through it.
pub struct AssetStores<'a> {
    meshes: &'a mut Assets<Mesh>,
    materials: &'a mut Assets<StandardMaterial>,
    pub tally: AssetTally,
}

impl<'a> AssetStores<'a> {
    pub fn new(meshes: &'a mut Assets<Mesh>, materials: &'a mut Assets<StandardMaterial>) -> Self {
        Self {
            meshes,
            materials,
            tally: AssetTally::default(),
        }
    }

    pub fn add_mesh(&mut self, mesh: impl Into<Mesh>) -> Handle<Mesh> {
        self.tally.meshes_allocated += 1;
        self.meshes.add(mesh)
    }

    pub fn add_material(&mut self, material: StandardMaterial) -> Handle<StandardMaterial> {
        self.tally.materials_allocated += 1;
        self.materials.add(material)
    }

    /// Recolor a material in place. Returns false if it was already released.
    pub fn set_base_color(&mut self, material: &Handle<StandardMaterial>, color: Color) -> bool {
        match self.materials.get_mut(material.id()) {
            Some(mat) => {
                mat.base_color = color;
                true
            }
            None => false,
        }
    }
}

pub trait Dispose {
    /// Release the resource. Releasing something that is already gone is an
    /// error the caller logs; it never panics.
    fn dispose(&self, stores: &mut AssetStores<'_>) -> Result<()>;
}

impl Dispose for Handle<Mesh> {
    fn dispose(&self, stores: &mut AssetStores<'_>) -> Result<()> {
        match stores.meshes.remove(self.id()) {
            Some(_) => {
                stores.tally.meshes_released += 1;
                Ok(())
            }
            None => Err(Report::new(TaskscapeError::Dispose(format!(
                "mesh {:?} was already released",
                self.id()
            )))),
        }
    }
}

impl Dispose for Handle<StandardMaterial> {
    fn dispose(&self, stores: &mut AssetStores<'_>) -> Result<()> {
        match stores.materials.remove(self.id()) {
            Some(_) => {
                stores.tally.materials_released += 1;
                Ok(())
            }
            None => Err(Report::new(TaskscapeError::Dispose(format!(
                "material {:?} was already released",
                self.id()
            )))),
        }
    }
}

/// Assets exclusively owned by the node carrying this component. Nodes that
/// borrow a parent's material leave `material` empty.
#[derive(Component, Clone, Debug)]
pub struct OwnedAssets {
    pub mesh: Handle<Mesh>,
    pub material: Option<Handle<StandardMaterial>>,
}

impl OwnedAssets {
    pub fn new(mesh: Handle<Mesh>, material: Handle<StandardMaterial>) -> Self {
        Self {
            mesh,
            material: Some(material),
        }
    }

    pub fn mesh_only(mesh: Handle<Mesh>) -> Self {
        Self {
            mesh,
            material: None,
        }
    }
}

impl Dispose for OwnedAssets {
    fn dispose(&self, stores: &mut AssetStores<'_>) -> Result<()> {
        // The material is released even if the mesh was already gone.
        let mesh = self.mesh.dispose(stores);
        let material = match &self.material {
            Some(material) => material.dispose(stores),
            None => Ok(()),
        };
        mesh.and(material)
    }
}

/// Dispose every item, logging failures without stopping. Returns the number
/// of items that failed.
pub fn dispose_each<'i, D>(
    items: impl IntoIterator<Item = (Entity, &'i D)>,
    stores: &mut AssetStores<'_>,
) -> usize
where
    D: Dispose + 'i,
{
    let mut failures = 0;
    for (entity, item) in items {
        if let Err(report) = item.dispose(stores) {
            failures += 1;
            warn!("failed to release assets of {entity}: {report:?}");
        }
    }
    failures
}
