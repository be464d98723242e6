//! Top-level descriptor sections other than packs, properties and resources.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use ipk_schema::{
    ActionStage, Author, CustomJar, CustomListener, GuiPrefs, Info, InstallerRequirement,
    LangPack, ListenerKind, NativeLibrary, NativeUninstallerLibrary, PackagingInfo, Panel,
    PanelAction, PanelEntry, RebootAction,
};

use crate::archive;
use crate::compiler::InstallerKind;
use crate::context::BuildContext;
use crate::descriptor::{Descriptor, DescriptorNode, os_constraints, write_xml};
use crate::error::{CompileError, Location};
use crate::listener::Phase;
use crate::paths;

/// Unpacker used when `<packaging>` names none.
pub const DEFAULT_UNPACKER: &str = "com.izforge.izpack.installer.unpacker.Unpacker";

/// Property holding the unpacker class.
pub const UNPACKER_PROPERTY: &str = "UNPACKER_CLASS";

/// Resource id of the uninstaller archive.
pub const UNINSTALLER_RESOURCE: &str = "IzPack.uninstaller";

/// Resource id of the uninstaller extensions archive.
pub const UNINSTALLER_EXT_RESOURCE: &str = "IzPack.uninstaller-ext";

/// Look-and-feel names with the archive implementing them.
const LOOK_AND_FEEL_JARS: &[(&str, &str)] = &[
    ("liquid", "liquidlnf.jar"),
    ("kunststoff", "kunststoff.jar"),
    ("metouia", "metouia.jar"),
    ("looks", "looks.jar"),
    ("substance", "substance.jar"),
    ("nimbus", "nimbus.jar"),
];

fn is_uninstall_stage(stage: Option<&str>) -> bool {
    stage.is_some_and(|s| s.eq_ignore_ascii_case("both") || s.eq_ignore_ascii_case("uninstall"))
}

fn require_url(descriptor: &Descriptor, node: &DescriptorNode) -> Result<String, CompileError> {
    let content = descriptor.require_content(node)?;
    url::Url::parse(&content)
        .map(|_| content.to_string())
        .map_err(|e| CompileError::InvalidValue {
            at: descriptor.at(node),
            message: format!("<{}> requires a valid URL: {e}", node.name),
        })
}

/// `<param><key/><value/></param>` children; incomplete params are skipped.
fn key_value_params(node: &DescriptorNode) -> BTreeMap<String, String> {
    node.children_named("param")
        .filter_map(|param| {
            let key = param.child("key")?;
            let value = param.child("value")?;
            Some((key.text().trim().to_string(), value.text().trim().to_string()))
        })
        .collect()
}

impl BuildContext<'_> {
    /// Home resource whose path is held in property `name`.
    fn property_resource(
        &self,
        name: &str,
        what: &str,
        at: &Location,
    ) -> Result<PathBuf, CompileError> {
        match self.properties.get(name).map(str::trim).filter(|p| !p.is_empty()) {
            Some(rel) => self.locator().home(rel, what, at, &self.temp),
            None => Err(CompileError::ResourceNotFound {
                at: at.clone(),
                what: format!("{what} (property '{name}' is not set)"),
                path: PathBuf::new(),
            }),
        }
    }

    /// Uninstaller writing is on unless `<info><uninstaller write="no"/>`.
    fn writes_uninstaller(&mut self, descriptor: &Descriptor) -> bool {
        match descriptor
            .root
            .child("info")
            .and_then(|info| info.child("uninstaller"))
        {
            Some(node) => descriptor.yes_no_or(node, "write", true, &mut self.diag),
            None => true,
        }
    }

    /// `<packaging>`: packager selection and the unpacker class.
    pub(crate) fn load_packaging(&mut self, descriptor: &Descriptor) -> Result<(), CompileError> {
        self.phase(Phase::LoadPackager, descriptor, |ctx| {
            let section = descriptor.root.child("packaging");
            let mut packaging = PackagingInfo {
                unpacker_class: DEFAULT_UNPACKER.to_string(),
                ..PackagingInfo::default()
            };
            if let Some(section) = section {
                if let Some(packager) = section.child("packager") {
                    packaging.packager_class =
                        Some(descriptor.require_attribute(packager, "class")?.to_string());
                    packaging.options = packager.child("options").map(write_xml);
                }
                if let Some(unpacker) = section.child("unpacker") {
                    packaging.unpacker_class =
                        descriptor.require_attribute(unpacker, "class")?.to_string();
                }
            }
            ctx.properties
                .define(UNPACKER_PROPERTY, packaging.unpacker_class.clone());
            tracing::debug!(packager = ?packaging.packager_class, unpacker = %packaging.unpacker_class, "packaging");
            ctx.model.packaging = packaging;
            Ok(())
        })
    }

    /// `<listeners>`: build listeners are loaded and registered, install-time
    /// listeners are recorded for the packager.
    pub(crate) fn add_custom_listeners(
        &mut self,
        descriptor: &Descriptor,
    ) -> Result<(), CompileError> {
        let Some(section) = descriptor.root.child("listeners") else {
            return Ok(());
        };
        for node in section.children_named("listener") {
            let loaded = self
                .plugin_loader()
                .load_listener(descriptor, node, &self.properties)?;
            if let Some(loaded) = loaded {
                self.listeners.push(loaded.listener);
            }

            for (attribute, kind) in [
                ("installer", ListenerKind::Installer),
                ("uninstaller", ListenerKind::Uninstaller),
            ] {
                let Some(class_name) = node.attribute(attribute) else {
                    continue;
                };
                let at = descriptor.at(node);
                let archive = self.plugin_loader().locate_archive(
                    node.attribute("jar"),
                    class_name,
                    &self.properties,
                    &at,
                )?;
                if archive.is_none() {
                    tracing::debug!(class = class_name, "no archive found for listener");
                }
                self.model.custom_listeners.push(CustomListener {
                    kind,
                    class_name: class_name.to_string(),
                    archive,
                    os: os_constraints(node),
                });
            }
        }
        Ok(())
    }

    /// `<info>`: product metadata and the uninstaller resource.
    pub(crate) fn add_info(&mut self, descriptor: &Descriptor) -> Result<(), CompileError> {
        self.phase(Phase::AddInfo, descriptor, |ctx| {
            let root = descriptor.require_child(&descriptor.root, "info")?;
            let text = |name: &str| -> Result<Option<String>, CompileError> {
                root.child(name)
                    .map(|n| descriptor.require_content(n).map(Cow::into_owned))
                    .transpose()
            };

            let mut info = Info {
                app_name: descriptor
                    .require_content(descriptor.require_child(root, "appname")?)?
                    .to_string(),
                app_version: descriptor
                    .require_content(descriptor.require_child(root, "appversion")?)?
                    .to_string(),
                install_subpath: text("appsubpath")?,
                runtime_version: text("javaversion")?,
                summary_log_path: text("summarylogfilepath")?,
                ..Info::default()
            };
            if let Some(url) = root.child("url") {
                info.url = Some(require_url(descriptor, url)?);
            }
            if let Some(authors) = root.child("authors") {
                for author in authors.children_named("author") {
                    info.authors.push(Author {
                        name: descriptor.require_attribute(author, "name")?.to_string(),
                        email: descriptor.require_attribute(author, "email")?.to_string(),
                    });
                }
            }
            info.requires_jdk = root
                .child("requiresjdk")
                .is_some_and(|n| n.text().trim() == "yes");

            let webdir = root.child("webdir");
            if let Some(webdir) = webdir {
                info.web_dir_url = Some(require_url(descriptor, webdir)?);
            }
            match (ctx.config.kind, webdir) {
                (InstallerKind::Web, None) => {
                    return Err(CompileError::MissingRequiredChild {
                        at: descriptor.at(root),
                        element: root.name.clone(),
                        child: "webdir".into(),
                    });
                }
                (InstallerKind::Standard, Some(_)) => info.web_dir_url = None,
                _ => {}
            }

            info.pack200 = root.child("pack200").is_some();

            let privileged = root.child("run-privileged");
            info.privileged = privileged.is_some();
            info.privileged_condition = privileged
                .and_then(|p| p.attribute("condition"))
                .map(str::to_string);

            if let Some(reboot) = root.child("rebootaction") {
                let action = reboot.text();
                info.reboot_action = RebootAction::from_str(action.trim()).map_err(|source| {
                    CompileError::InvalidEnumValue {
                        at: descriptor.at(reboot),
                        source,
                    }
                })?;
                info.reboot_condition = reboot.attribute("condition").map(str::to_string);
            }

            info.write_uninstaller = ctx.writes_uninstaller(descriptor);
            if info.write_uninstaller {
                let at = descriptor.at(root);
                let jar = ctx.property_resource("uninstaller", "uninstaller", &at)?;
                ctx.registry.add(UNINSTALLER_RESOURCE, jar, at);

                if let Some(privileged) = privileged {
                    info.privileged_uninstaller =
                        descriptor.yes_no_or(privileged, "uninstaller", true, &mut ctx.diag);
                }
                if let Some(uninstaller) = root.child("uninstaller") {
                    info.uninstaller_name = uninstaller
                        .attribute("name")
                        .filter(|n| n.len() > ".jar".len())
                        .map(str::to_string);
                    info.uninstaller_path = uninstaller.attribute("path").map(str::to_string);
                    info.uninstaller_condition =
                        uninstaller.attribute("condition").map(str::to_string);
                }
            }

            if let Some(node) = root.child("writeinstallationinformation") {
                let value = descriptor.require_content(node)?;
                info.write_installation_information = matches!(
                    value.to_ascii_lowercase().as_str(),
                    "yes" | "true"
                );
            }

            info.unpacker_class = ctx.properties.get(UNPACKER_PROPERTY).map(str::to_string);
            ctx.model.info = info;
            Ok(())
        })
    }

    /// `<guiprefs>`: window settings, look-and-feel mappings and their archives.
    pub(crate) fn add_gui_prefs(&mut self, descriptor: &Descriptor) -> Result<(), CompileError> {
        self.phase(Phase::AddGuiPrefs, descriptor, |ctx| {
            let Some(node) = descriptor.root.child("guiprefs") else {
                ctx.model.gui_prefs = GuiPrefs::default();
                return Ok(());
            };
            let mut prefs = GuiPrefs {
                resizable: descriptor.require_yes_no(node, "resizable")?,
                width: descriptor.require_u32(node, "width")?,
                height: descriptor.require_u32(node, "height")?,
                ..GuiPrefs::default()
            };

            for laf in node.children_named("laf") {
                let name = descriptor.require_attribute(laf, "name")?;
                descriptor.require_child(laf, "os")?;
                for os in laf.children_named("os") {
                    let family = descriptor.require_attribute(os, "family")?;
                    prefs.look_and_feel.insert(family.to_string(), name.to_string());
                }
                let mut params = BTreeMap::new();
                for param in laf.children_named("param") {
                    params.insert(
                        descriptor.require_attribute(param, "name")?.to_string(),
                        descriptor.require_attribute(param, "value")?.to_string(),
                    );
                }
                prefs.look_and_feel_params.insert(name.to_string(), params);
            }
            for modifier in node.children_named("modifier") {
                prefs.modifiers.insert(
                    descriptor.require_attribute(modifier, "key")?.to_string(),
                    descriptor.require_attribute(modifier, "value")?.to_string(),
                );
            }

            // Only the final mapping of each family needs its archive.
            let at = descriptor.at(node);
            for name in prefs.look_and_feel.values() {
                let Some((_, jar)) = LOOK_AND_FEEL_JARS.iter().find(|(n, _)| *n == name.as_str()) else {
                    ctx.diag
                        .warn(at.clone(), format!("unrecognized look and feel '{name}', skipped"));
                    continue;
                };
                let path = ctx
                    .locator()
                    .home(&paths::lib(jar), "look and feel archive", &at, &ctx.temp)?;
                if !ctx.model.jar_contents.contains(&path) {
                    ctx.model.jar_contents.push(path);
                }
            }
            ctx.model.gui_prefs = prefs;
            Ok(())
        })
    }

    /// `<locale>`: at least one language pack.
    pub(crate) fn add_langpacks(&mut self, descriptor: &Descriptor) -> Result<(), CompileError> {
        self.phase(Phase::AddLangpacks, descriptor, |ctx| {
            let root = descriptor.require_child(&descriptor.root, "locale")?;
            if root.child("langpack").is_none() {
                return Err(CompileError::MissingRequiredChild {
                    at: descriptor.at(root),
                    element: root.name.clone(),
                    child: "langpack".into(),
                });
            }
            for node in root.children_named("langpack") {
                let iso3 = descriptor.require_attribute(node, "iso3")?;
                let at = descriptor.at(node);
                let locator = ctx.locator();
                let xml = locator.home(&paths::langpack_strings(iso3), "language file", &at, &ctx.temp)?;
                let flag = locator.home(&paths::langpack_flag(iso3), "language flag", &at, &ctx.temp)?;
                ctx.model.lang_packs.push(LangPack {
                    iso3: iso3.to_string(),
                    xml,
                    flag,
                });
            }
            Ok(())
        })
    }

    /// `<native>`: native libraries, some of them also for the uninstaller.
    pub(crate) fn add_native_libraries(
        &mut self,
        descriptor: &Descriptor,
    ) -> Result<(), CompileError> {
        self.phase(Phase::AddNativeLibraries, descriptor, |ctx| {
            let mut uninstaller_needs_ext = false;
            for node in descriptor.root.children_named("native") {
                let kind = descriptor.require_attribute(node, "type")?;
                let name = descriptor.require_attribute(node, "name")?;
                let at = descriptor.at(node);
                let rel = node
                    .attribute("src")
                    .map_or_else(|| paths::native_library(kind, name), str::to_string);
                let path = ctx.locator().home(&rel, "native library", &at, &ctx.temp)?;
                ctx.model.native_libraries.push(NativeLibrary {
                    name: name.to_string(),
                    path,
                });
                if is_uninstall_stage(node.attribute("stage")) {
                    ctx.model
                        .native_uninstaller_libraries
                        .push(NativeUninstallerLibrary {
                            name: name.to_string(),
                            os: os_constraints(node),
                        });
                    uninstaller_needs_ext = true;
                }
            }

            if uninstaller_needs_ext && ctx.writes_uninstaller(descriptor) {
                let info = descriptor.require_child(&descriptor.root, "info")?;
                let at = descriptor.at(info);
                let ext =
                    ctx.property_resource("uninstaller-ext", "uninstaller extensions", &at)?;
                ctx.registry.add(UNINSTALLER_EXT_RESOURCE, ext, at);
            }
            Ok(())
        })
    }

    /// `<jar>`: project archives merged into the installer.
    pub(crate) fn add_jars(&mut self, descriptor: &Descriptor) -> Result<(), CompileError> {
        self.phase(Phase::AddJars, descriptor, |ctx| {
            for node in descriptor.root.children_named("jar") {
                let src = descriptor.require_attribute(node, "src")?;
                let at = descriptor.at(node);
                let path = ctx.locator().project(src, "jar file", &at)?;
                if is_uninstall_stage(node.attribute("stage")) {
                    let contained_files = archive::list_files(&path, &at)?;
                    ctx.model.custom_jars.push(CustomJar {
                        archive: path.clone(),
                        contained_files,
                    });
                }
                ctx.model.jar_contents.push(path);
            }
            Ok(())
        })
    }

    /// `<panels>`: the wizard panels in order.
    pub(crate) fn add_panels(&mut self, descriptor: &Descriptor) -> Result<(), CompileError> {
        self.phase(Phase::AddPanels, descriptor, |ctx| {
            let root = descriptor.require_child(&descriptor.root, "panels")?;
            if root.child("panel").is_none() {
                return Err(CompileError::MissingRequiredChild {
                    at: descriptor.at(root),
                    element: root.name.clone(),
                    child: "panel".into(),
                });
            }
            for (index, node) in root.children_named("panel").enumerate() {
                let entry = ctx.build_panel(descriptor, node, index + 1)?;
                ctx.model.panels.push(entry);
            }
            Ok(())
        })
    }

    fn build_panel(
        &mut self,
        descriptor: &Descriptor,
        node: &DescriptorNode,
        counter: usize,
    ) -> Result<PanelEntry, CompileError> {
        let class_name = descriptor.require_attribute(node, "classname")?;
        let at = descriptor.at(node);
        let id = node.attribute("id");

        // jar="" means the user merges the panel classes themselves.
        let jar = node
            .attribute("jar")
            .map_or_else(|| paths::panel_jar(class_name), str::to_string);
        let archive = if jar.is_empty() {
            None
        } else {
            let found = self.locator().find_home(&jar, &at, &self.temp)?;
            if found.is_none() {
                self.diag.warn(at.clone(), format!("panel archive {jar} not found"));
            }
            found
        };
        let qualified = match &archive {
            Some(path) => {
                let entries = archive::list_files(path, &at)?;
                archive::resolve_class_name(entries.iter().map(String::as_str), class_name, &at)?
            }
            None => None,
        };

        let mut panel = Panel {
            class_name: qualified.unwrap_or_else(|| class_name.to_string()),
            id: id.map(str::to_string),
            os: os_constraints(node),
            condition: node.attribute("condition").map(str::to_string),
            configuration: node
                .child("configuration")
                .map(key_value_params)
                .unwrap_or_default(),
            validator: node
                .child("validator")
                .and_then(|v| v.attribute("classname"))
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            help: BTreeMap::new(),
            actions: BTreeMap::new(),
        };

        for help in node.children_named("help") {
            let iso3 = descriptor.require_attribute(help, "iso3")?;
            let src = descriptor.require_attribute(help, "src")?;
            let resource_id = format!("{}_{counter}_help_{iso3}.html", id.unwrap_or(class_name));
            let help_at = descriptor.at(help);
            let path = self.locator().project(src, "help", &help_at)?;
            self.registry.add(&resource_id, path, help_at);
            panel.help.insert(iso3.to_string(), resource_id);
        }

        if let Some(actions) = node.child("actions") {
            if actions.child("action").is_none() {
                return Err(CompileError::MissingRequiredChild {
                    at: descriptor.at(actions),
                    element: actions.name.clone(),
                    child: "action".into(),
                });
            }
            for action in actions.children_named("action") {
                let stage_at = descriptor.at(action);
                let stage = ActionStage::from_str(action.attribute_or("stage", ""))
                    .map_err(|source| CompileError::InvalidEnumValue {
                        at: stage_at,
                        source,
                    })?;
                let class_name = descriptor.require_attribute(action, "classname")?;
                panel.add_action(
                    stage,
                    PanelAction {
                        class_name: class_name.to_string(),
                        configuration: key_value_params(action),
                    },
                );
            }
        }

        tracing::debug!(panel = %panel.class_name, archive = ?archive, "panel");
        Ok(PanelEntry { panel, archive })
    }

    /// `<installerrequirements>`, in declaration order.
    pub(crate) fn add_installer_requirements(
        &mut self,
        descriptor: &Descriptor,
    ) -> Result<(), CompileError> {
        self.phase(Phase::AddInstallerRequirement, descriptor, |ctx| {
            let requirements = descriptor
                .root
                .child("installerrequirements")
                .into_iter()
                .flat_map(|root| root.children_named("installerrequirement"))
                .map(|node| InstallerRequirement {
                    condition: node.attribute("condition").map(str::to_string),
                    message: node.attribute("message").map(str::to_string),
                });
            ctx.model.installer_requirements.extend(requirements);
            Ok(())
        })
    }
}
