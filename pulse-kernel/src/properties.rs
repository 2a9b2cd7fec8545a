// pulse-kernel: property extension
// Configures participating components from per-component XML property
// files and optionally writes snapshots back at kernel stop.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use tracing::{debug, error, warn};

use pulse_core::{MarshalError, PropertyBag, XmlDemarshaller, XmlMarshaller};

use crate::component::{Component, ComponentSet};
use crate::config::PropertyPolicy;
use crate::error::{KernelError, KernelResult};
use crate::extension::KernelExtension;

/// Kernel extension contributing the property facet.
///
/// A component exposing [`crate::component::PropertyFacet`] is configured
/// from `<directory>/<component><extension>`, either when loaded
/// (`configureOnLoad`) or at kernel start. With `save_props` set, final
/// values are exported to `<directory>/<prefix><component><extension>` at
/// kernel stop.
pub struct PropertyExtension {
    policy: PropertyPolicy,
}

impl PropertyExtension {
    pub fn new(policy: PropertyPolicy) -> Self {
        Self { policy }
    }

    fn read_path(&self, component: &str) -> PathBuf {
        self.policy
            .directory
            .join(format!("{}{}", component, self.policy.save_file_extension))
    }

    fn save_path(&self, component: &str) -> PathBuf {
        self.policy.directory.join(format!(
            "{}{}{}",
            self.policy.save_file_prefix, component, self.policy.save_file_extension
        ))
    }

    /// The property bag currently on file for `component`; an empty bag
    /// for an absent file under `ignoreMissingFiles`.
    pub fn component_properties(&self, component: &str) -> KernelResult<PropertyBag> {
        let path = self.read_path(component);
        if !path.exists() {
            if self.policy.ignore_missing_files {
                return Ok(PropertyBag::new());
            }
            return Err(KernelError::MissingPropertyFile(path));
        }
        let file = File::open(&path).map_err(MarshalError::Io)?;
        let bag = XmlDemarshaller::new(BufReader::new(file)).demarshal()?;
        Ok(bag)
    }

    fn configure(&self, component: &mut dyn Component) -> bool {
        let name = component.name().to_string();
        if component.properties().is_none() {
            return true;
        }
        let bag = match self.component_properties(&name) {
            Ok(bag) => bag,
            Err(err) => {
                error!(component = %name, %err, "property file load failed");
                return false;
            }
        };
        let facet = component
            .properties()
            .expect("facet probed above");
        if facet.update_properties(&bag) {
            debug!(component = %name, properties = bag.len(), "component configured");
            true
        } else {
            error!(component = %name, "component rejected its properties");
            false
        }
    }

    fn save(&self, component: &mut dyn Component) {
        let name = component.name().to_string();
        let facet = match component.properties() {
            Some(facet) => facet,
            None => return,
        };
        let mut bag = PropertyBag::with_type(name.clone());
        facet.export_properties(&mut bag);

        let path = self.save_path(&name);
        let file = match File::create(&path) {
            Ok(file) => file,
            Err(err) => {
                warn!(component = %name, path = %path.display(), %err, "property snapshot failed");
                return;
            }
        };
        match XmlMarshaller::new(BufWriter::new(file)).marshal(&bag) {
            Ok(()) => debug!(component = %name, path = %path.display(), "properties saved"),
            Err(err) => {
                warn!(component = %name, path = %path.display(), %err, "property snapshot failed")
            }
        }
    }
}

impl KernelExtension for PropertyExtension {
    fn name(&self) -> &str {
        "properties"
    }

    fn initialize(&mut self, components: &mut ComponentSet<'_>) -> bool {
        if self.policy.configure_on_load {
            return true;
        }
        for component in components.iter_mut() {
            if !self.configure(component) {
                return false;
            }
        }
        true
    }

    fn finalize(&mut self, components: &mut ComponentSet<'_>) {
        if !self.policy.save_props {
            return;
        }
        for component in components.iter_mut() {
            self.save(component);
        }
    }

    fn component_loaded(&mut self, component: &mut dyn Component) -> bool {
        if !self.policy.configure_on_load {
            return true;
        }
        self.configure(component)
    }
}
