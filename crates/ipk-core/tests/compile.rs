mod common;

use std::sync::{Arc, Mutex};

use common::{Project, refpack};
use ipk_core::descriptor::parse_xml;
use ipk_core::listener::ListenerError;
use ipk_core::properties::PropertyTable;
use ipk_core::{
    BuildListener, CompileError, DescriptorNode, Phase, PhaseState, PluginCatalog,
    UNINSTALLER_RESOURCE,
};
use ipk_schema::{AdditionalData, InstallerModel, OverridePolicy, Rule};

#[test]
fn test_required_pack_and_exclusive_dependent() {
    let project = Project::new();
    project.write("a.txt", "a");
    project.write("b.txt", "b");

    let (result, sink) = project.compile(
        r#"<packs>
             <pack name="A" required="yes">
               <description>Core</description>
               <singlefile src="a.txt" target="$INSTALL_PATH/a.txt"/>
             </pack>
             <pack name="B" required="no" excludeGroup="opt">
               <description>Optional</description>
               <depends packname="A"/>
               <singlefile src="b.txt" target="$INSTALL_PATH/b.txt"/>
             </pack>
           </packs>"#,
    );
    let report = result.unwrap();
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert!(sink.created);

    let a = sink.model.pack_named("A").unwrap();
    let b = sink.model.pack_named("B").unwrap();
    assert!(a.required);
    assert!(a.preselected);
    assert!(!b.preselected);
    assert_eq!(b.dependencies, ["A"]);
    assert_eq!(a.files.len(), 1);
    assert_eq!(b.files[0].target, "$INSTALL_PATH/b.txt");
    assert_eq!(b.files[0].size, 1);
    assert!(sink.resource_content.contains_key(UNINSTALLER_RESOURCE));
}

#[test]
fn test_duplicate_condition_keeps_second_and_warns_once() {
    let project = Project::new();
    let (result, sink) = project.compile(
        r#"<conditions>
             <condition type="variable" id="isLinux"><name>os</name><value>linux</value></condition>
             <condition type="variable" id="isLinux"><name>os</name><value>unix</value></condition>
           </conditions>
           <packs><pack name="core" required="yes"><description/></pack></packs>"#,
    );
    let report = result.unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(sink.model.conditions.len(), 1);
    assert!(matches!(
        &sink.model.conditions["isLinux"].rule,
        Rule::Variable { value, .. } if value == "unix"
    ));
}

#[test]
fn test_missing_dependency_aborts_without_commit() {
    let project = Project::new();
    let (result, sink) = project.compile(
        r#"<packs>
             <pack name="B" required="no"><description/><depends packname="A"/></pack>
           </packs>"#,
    );
    let err = result.unwrap_err();
    assert!(matches!(
        err,
        CompileError::DependencyUnresolved { ref pack, ref missing, .. } if pack == "B" && missing == "A"
    ));
    assert!(!sink.created);
    assert!(sink.model.packs.is_empty());
}

#[test]
fn test_dependency_only_in_sibling_refpack_is_unresolved() {
    let project = Project::new();
    project.write(
        "refs/a.xml",
        refpack(r#"<pack name="A" required="yes"><description/></pack>"#),
    );
    project.write(
        "refs/b.xml",
        refpack(r#"<pack name="B" required="no"><description/><depends packname="A"/></pack>"#),
    );

    let (result, _) = project.compile(r#"<packs><refpack file="refs/b.xml"/></packs>"#);
    assert!(matches!(
        result,
        Err(CompileError::DependencyUnresolved { ref missing, .. }) if missing == "A"
    ));

    let (result, sink) = project.compile(r#"<packs><refpackset dir="refs" includes="*.xml"/></packs>"#);
    result.unwrap();
    let names: Vec<_> = sink.model.packs.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["A", "B"]);
}

#[test]
fn test_refpack_resources_and_properties() {
    let project = Project::new();
    project.write("licence.txt", "MIT");
    project.write(
        "sub/extra.xml",
        r#"<installation version="1.0">
             <properties><property name="extra.target" value="$INSTALL_PATH/extra"/></properties>
             <resources><res id="LicencePanel.licence" src="licence.txt"/></resources>
             <packs><pack name="${app.name} extra" required="no"><description/></pack></packs>
           </installation>"#,
    );
    let (result, sink) = project.compile(
        r#"<properties><property name="app.name" value="Demo"/></properties>
           <packs>
             <pack name="core" required="yes"><description/></pack>
             <refpack file="sub/extra.xml"/>
           </packs>"#,
    );
    result.unwrap();
    assert!(sink.model.pack_named("Demo extra").is_some());
    assert_eq!(sink.resource_content["LicencePanel.licence"], b"MIT");
    assert_eq!(sink.model.properties["extra.target"], "$INSTALL_PATH/extra");
}

#[test]
fn test_refpack_including_itself_is_rejected() {
    let project = Project::new();
    project.write("loop.xml", refpack(r#"<refpack file="loop.xml"/>"#));
    let (result, _) = project.compile(r#"<packs><refpack file="loop.xml"/></packs>"#);
    assert!(matches!(result, Err(CompileError::StructuralConflict { .. })));
}

#[test]
fn test_self_contained_refpack() {
    let project = Project::new();
    let inner = refpack(r#"<pack name="Extra" required="no"><description>From zip</description></pack>"#);
    project.zip(
        "addons/extra.zip",
        &[("META-INF/", ""), ("META-INF/izpack.xml", inner.as_str())],
    );
    project.write("addons/extra.jar", "not a zip");

    let (result, sink) = project.compile(
        r#"<packs><refpack file="addons/extra.zip" selfcontained="true"/></packs>"#,
    );
    result.unwrap();
    assert_eq!(sink.model.pack_named("Extra").unwrap().description, "From zip");

    let (result, _) = project.compile(
        r#"<packs><refpack file="addons/extra.jar" selfcontained="true"/></packs>"#,
    );
    assert!(matches!(result, Err(CompileError::InvalidPath { .. })));
}

#[test]
fn test_localized_resources_merge_across_refpacks() {
    let project = Project::new();
    project.write(
        "langs/main_eng.xml",
        r#"<langpack><meta/><str id="core" txt="Core"/><str id="docs" txt="Docs"/></langpack>"#,
    );
    project.write(
        "langs/extra_eng.xml",
        r#"<langpack><meta/><str id="extra" txt="Extra"/></langpack>"#,
    );
    project.write(
        "extra.xml",
        r#"<installation version="1.0">
             <resources><res id="packsLang.xml_eng" src="langs/extra_eng.xml"/></resources>
             <packs><pack name="extra" required="no"><description/></pack></packs>
           </installation>"#,
    );
    let (result, sink) = project.compile(
        r#"<resources><res id="packsLang.xml_eng" src="langs/main_eng.xml"/></resources>
           <packs>
             <pack name="core" required="yes"><description/></pack>
             <refpack file="extra.xml"/>
           </packs>"#,
    );
    result.unwrap();

    let merged = String::from_utf8(sink.resource_content["packsLang.xml_eng"].clone()).unwrap();
    let root = parse_xml(&merged, None).unwrap();
    let ids: Vec<_> = root
        .children_named("str")
        .filter_map(|s| s.attribute("id"))
        .collect();
    assert_eq!(ids, ["core", "docs", "extra"]);
    assert_eq!(root.children_named("meta").count(), 1);
}

#[test]
fn test_parsed_xml_resource_keeps_namespaces_and_mixed_content() {
    let project = Project::new();
    project.write(
        "shortcuts.xml",
        r#"<shortcuts xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:noNamespaceSchemaLocation="shortcuts.xsd">
  <!-- menu entries -->
  <shortcut name="${PRODUCT}" xml:lang="en">Start <b>${PRODUCT}</b> now</shortcut>
</shortcuts>"#,
    );
    let (result, sink) = project.compile(
        r#"<variables><variable name="PRODUCT" value="Demo"/></variables>
           <resources><res id="shortcutSpec.xml" src="shortcuts.xml" parse="yes" parsexml="yes"/></resources>
           <packs><pack name="core" required="yes"><description/></pack></packs>"#,
    );
    result.unwrap();

    let text = String::from_utf8(sink.resource_content["shortcutSpec.xml"].clone()).unwrap();
    assert!(text.contains(r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#));
    assert!(text.contains(r#"xsi:noNamespaceSchemaLocation="shortcuts.xsd""#));
    assert!(text.contains("<!-- menu entries -->"));
    assert!(text.contains(r#"<shortcut name="Demo" xml:lang="en">Start <b>Demo</b> now</shortcut>"#));
}

#[test]
fn test_override_keywords() {
    let project = Project::new();
    project.write("f.txt", "x");
    let files: String = ["true", "FALSE", "AskTrue", "askfalse", "update"]
        .iter()
        .map(|v| format!(r#"<singlefile src="f.txt" target="t/{v}" override="{v}"/>"#))
        .collect();
    let (result, sink) = project.compile(&format!(
        r#"<packs><pack name="p" required="yes"><description/>{files}</pack></packs>"#
    ));
    result.unwrap();
    let policies: Vec<_> = sink.model.packs[0].files.iter().map(|f| f.override_policy).collect();
    assert_eq!(
        policies,
        [
            OverridePolicy::AlwaysTrue,
            OverridePolicy::AlwaysFalse,
            OverridePolicy::AskTrue,
            OverridePolicy::AskFalse,
            OverridePolicy::Update,
        ]
    );

    let (result, _) = project.compile(
        r#"<packs><pack name="p" required="yes"><description/>
             <singlefile src="f.txt" target="t" override="maybe"/>
           </pack></packs>"#,
    );
    assert!(matches!(result, Err(CompileError::InvalidEnumValue { .. })));
}

#[test]
fn test_required_pack_in_exclude_group() {
    let project = Project::new();
    let (result, sink) = project.compile(
        r#"<packs><pack name="p" required="yes" excludeGroup="g"><description/></pack></packs>"#,
    );
    let err = result.unwrap_err();
    assert!(matches!(err, CompileError::StructuralConflict { .. }));
    assert!(err.location().and_then(|at| at.line).is_some());
    assert!(!sink.created);
}

#[test]
fn test_blockable_without_windows_warns() {
    let project = Project::new();
    project.write("f.dll", "x");
    let (result, sink) = project.compile(
        r#"<packs><pack name="p" required="yes"><description/>
             <singlefile src="f.dll" target="a.dll" blockable="auto"/>
             <singlefile src="f.dll" target="b.dll" blockable="auto"><os family="windows"/></singlefile>
           </pack></packs>"#,
    );
    let report = result.unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert!(sink.model.packs[0].files[0].os.is_empty());
}

#[test]
fn test_substitution_is_idempotent() {
    let project = Project::new();
    let (result, sink) = project.compile(
        r#"<properties>
             <property name="vendor" value="Acme"/>
             <property name="product" value="${vendor} Tools"/>
           </properties>
           <packs><pack name="${product}" required="yes"><description>${missing}</description></pack></packs>"#,
    );
    result.unwrap();
    let pack = &sink.model.packs[0];
    assert_eq!(pack.name, "Acme Tools");
    assert_eq!(pack.description, "${missing}");

    let mut table = PropertyTable::default();
    for (name, value) in &sink.model.properties {
        table.define(name.as_str(), value.as_str());
    }
    let tree = parse_xml(r#"<p a="${product}">${vendor} and ${unknown}</p>"#, None).unwrap();
    let once = table.substitute_tree(&tree);
    assert_eq!(table.substitute_tree(&once), once);
}

#[test]
fn test_command_line_properties_win() {
    let project = Project::new();
    let config = project.config().with_property("product", "Override");
    let (result, sink) = project.compile_with(
        config,
        r#"<properties><property name="product" value="Descriptor"/></properties>
           <packs><pack name="${product}" required="yes"><description/></pack></packs>"#,
    );
    result.unwrap();
    assert_eq!(sink.model.packs[0].name, "Override");
    assert_eq!(
        sink.model.properties["basedir"],
        project.path().to_string_lossy()
    );
}

type Log = Arc<Mutex<Vec<String>>>;

struct Recorder {
    log: Log,
}

impl BuildListener for Recorder {
    fn notify(&mut self, phase: Phase, state: PhaseState, _: &DescriptorNode, _: &InstallerModel) {
        self.log.lock().unwrap().push(format!("{phase}:{state:?}"));
    }

    fn revise_additional_data(
        &mut self,
        existing: Option<AdditionalData>,
        file: &DescriptorNode,
    ) -> Result<Option<AdditionalData>, ListenerError> {
        let mut data = existing.unwrap_or_default();
        data.insert("element".into(), file.name.clone());
        Ok(Some(data))
    }
}

#[test]
fn test_blank_uninstaller_property_is_not_found() {
    let project = Project::new();
    let config = project
        .config()
        .with_home(project.path())
        .with_property("uninstaller", "");
    let (result, sink) = project.compile_with(
        config,
        r#"<packs><pack name="core" required="yes"><description/></pack></packs>"#,
    );
    assert!(matches!(
        result,
        Err(CompileError::ResourceNotFound { ref what, .. }) if what.contains("'uninstaller'")
    ));
    assert!(!sink.created);
}

#[test]
fn test_build_listener_sees_every_phase_in_order() {
    let project = Project::new();
    project.zip("listeners/recorder.jar", &[("com/acme/build/Recorder.class", "")]);
    project.write("f.txt", "x");

    let log: Log = Arc::default();
    let shared = Arc::clone(&log);
    let mut catalog = PluginCatalog::default();
    catalog.register_listener("com.acme.build.Recorder", move || Recorder {
        log: Arc::clone(&shared),
    });

    let (result, sink) = project.compile_with(
        project.config().with_catalog(catalog),
        r#"<listeners>
             <listener compiler="Recorder" jar="${basedir}/listeners/recorder.jar"/>
           </listeners>
           <packs><pack name="p" required="yes"><description/>
             <singlefile src="f.txt" target="f.txt"/>
           </pack></packs>"#,
    );
    result.unwrap();

    let log = log.lock().unwrap();
    let begins: Vec<_> = log
        .iter()
        .filter_map(|e| e.strip_suffix(":Begin"))
        .collect();
    assert_eq!(
        begins,
        [
            "substituteProperties",
            "addVariables",
            "addDynamicVariables",
            "addConditions",
            "addInfo",
            "addGUIPrefs",
            "addLangpacks",
            "addResources",
            "addNativeLibraries",
            "addJars",
            "addPanels",
            "addPacks",
            "addPacksSingle",
            "addInstallerRequirement",
        ]
    );
    assert_eq!(log.iter().filter(|e| e.ends_with(":End")).count(), begins.len());
    assert_eq!(sink.model.packs[0].files[0].additional["element"], "singlefile");
}

#[test]
fn test_unknown_build_listener_fails() {
    let project = Project::new();
    project.zip("listeners/recorder.jar", &[("com/acme/build/Recorder.class", "")]);
    let (result, _) = project.compile(
        r#"<listeners>
             <listener compiler="Recorder" jar="${basedir}/listeners/recorder.jar"/>
           </listeners>
           <packs><pack name="p" required="yes"><description/></pack></packs>"#,
    );
    assert!(matches!(result, Err(CompileError::ListenerLoadFailure { .. })));
}

#[test]
fn test_version_mismatch() {
    let project = Project::new();
    let path = project.write("old.xml", r#"<installation version="5.0"/>"#);
    let mut sink = ipk_core::InMemoryPackager::default();
    let result = ipk_core::Compiler::new(project.config()).compile_file(&path, &mut sink);
    assert!(matches!(result, Err(CompileError::VersionMismatch { .. })));
}
