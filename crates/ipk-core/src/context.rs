//! State of one compile.
//!
//! A [`BuildContext`] owns every table the phases fill in. It lives for a
//! single compile and is never shared; the model it builds only reaches a
//! packager once all phases have succeeded.

use std::path::{Path, PathBuf};

use ipk_schema::InstallerModel;

use crate::compiler::CompilerConfig;
use crate::descriptor::{Descriptor, DescriptorNode};
use crate::error::{CompileError, Diagnostics, Location};
use crate::listener::{Listeners, Phase, PhaseState, PluginLoader};
use crate::merge::merge_localized;
use crate::properties::{self, PropertyTable};
use crate::resources::{self, ResourceLocator, ResourceRegistry, TempArtifacts};
use crate::{conditions, variables};

pub(crate) struct BuildContext<'a> {
    pub(crate) config: &'a CompilerConfig,
    pub(crate) basedir: &'a Path,
    pub(crate) env: Vec<(String, String)>,
    pub(crate) temp: TempArtifacts,
    pub(crate) properties: PropertyTable,
    pub(crate) model: InstallerModel,
    pub(crate) registry: ResourceRegistry,
    pub(crate) listeners: Listeners,
    pub(crate) diag: Diagnostics,
    /// Declaration site of each pack in `model.packs`, by index.
    pub(crate) pack_locations: Vec<Location>,
    /// Descriptor files currently being processed, outermost first.
    pub(crate) ref_stack: Vec<PathBuf>,
}

impl<'a> BuildContext<'a> {
    pub(crate) fn new(
        config: &'a CompilerConfig,
        basedir: &'a Path,
        env: Vec<(String, String)>,
    ) -> Result<Self, CompileError> {
        let temp = TempArtifacts::new().map_err(|e| {
            CompileError::io(Location::default(), "creating session directory", e)
        })?;
        tracing::debug!(dir = %temp.path().display(), "session directory");
        Ok(Self {
            config,
            basedir,
            env,
            temp,
            properties: PropertyTable::default(),
            model: InstallerModel::default(),
            registry: ResourceRegistry::default(),
            listeners: Listeners::default(),
            diag: Diagnostics::default(),
            pack_locations: Vec::new(),
            ref_stack: Vec::new(),
        })
    }

    pub(crate) fn locator(&self) -> ResourceLocator<'a> {
        ResourceLocator {
            basedir: self.basedir,
            home: self.config.home.as_deref(),
            embedded: &self.config.embedded,
        }
    }

    pub(crate) fn plugin_loader(&self) -> PluginLoader<'_> {
        PluginLoader {
            catalog: &self.config.catalog,
            locator: self.locator(),
            search_path: &self.config.listener_search_path,
            temp: &self.temp,
        }
    }

    pub(crate) fn notify(&mut self, phase: Phase, state: PhaseState, node: &DescriptorNode) {
        tracing::trace!(%phase, ?state, "phase");
        self.listeners.notify(phase, state, node, &self.model);
    }

    /// Run `f` between the begin and end notifications of `phase`.
    pub(crate) fn phase<T>(
        &mut self,
        phase: Phase,
        descriptor: &Descriptor,
        f: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        self.notify(phase, PhaseState::Begin, &descriptor.root);
        let out = f(self)?;
        self.notify(phase, PhaseState::End, &descriptor.root);
        Ok(out)
    }

    /// Every phase, in order, on the main descriptor.
    pub(crate) fn run(&mut self, raw: &Descriptor) -> Result<(), CompileError> {
        self.load_packaging(raw)?;
        self.add_custom_listeners(raw)?;

        let descriptor = self.substitute_properties(raw)?;
        let d = &descriptor;

        self.phase(Phase::AddVariables, d, |ctx| {
            variables::add_variables(d, &mut ctx.model.variables, &mut ctx.diag)
        })?;
        self.phase(Phase::AddDynamicVariables, d, |ctx| {
            variables::add_dynamic_variables(d, &mut ctx.model.dynamic_variables, &mut ctx.diag)
        })?;
        self.phase(Phase::AddConditions, d, |ctx| {
            conditions::add_conditions(d, &mut ctx.model.conditions, &mut ctx.diag)
        })?;
        self.add_info(d)?;
        self.add_gui_prefs(d)?;
        self.add_langpacks(d)?;
        self.add_resources(d)?;
        self.add_native_libraries(d)?;
        self.add_jars(d)?;
        self.add_panels(d)?;
        self.add_packs(d)?;
        self.add_installer_requirements(d)?;

        self.finalize_resources()
    }

    /// Run the property declarations of `descriptor`, then substitute the
    /// rest of its tree. The `<properties>` subtree is kept as written.
    pub(crate) fn substitute_properties(
        &mut self,
        descriptor: &Descriptor,
    ) -> Result<Descriptor, CompileError> {
        self.notify(Phase::SubstituteProperties, PhaseState::Begin, &descriptor.root);
        properties::load_declarations(
            descriptor,
            &mut self.properties,
            self.basedir,
            &self.env,
            &mut self.diag,
        )?;
        let substituted = descriptor.with_root(self.properties.substitute_tree(&descriptor.root));
        self.model.properties = self.properties.to_map();
        self.notify(Phase::SubstituteProperties, PhaseState::End, &substituted.root);
        Ok(substituted)
    }

    /// `<resources>` of the main descriptor or of a ref-pack.
    pub(crate) fn add_resources(&mut self, descriptor: &Descriptor) -> Result<(), CompileError> {
        self.phase(Phase::AddResources, descriptor, |ctx| {
            let locator = ctx.locator();
            resources::add_resources(
                descriptor,
                &locator,
                &ctx.model.variables,
                &mut ctx.registry,
                &ctx.temp,
                &mut ctx.diag,
            )
        })
    }

    /// Merge localized resource families and move every finalized resource
    /// into the model. Runs once, after all ref-packs were read.
    fn finalize_resources(&mut self) -> Result<(), CompileError> {
        let (resources, localized) = std::mem::take(&mut self.registry).into_parts();
        self.model.resources = resources;
        self.model
            .resources
            .extend(merge_localized(&localized, &self.temp)?);
        self.model.properties = self.properties.to_map();
        Ok(())
    }
}
