//! End-to-end conversions over fixture trees

mod common;

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use common::{
    asset_paths, binary_stl, chain_urdf, layer_files, mesh, prim_spec_count, triangle_at,
    write_file, PANEL_MTL, TEXTURED_QUAD_OBJ,
};
use urdf2usd_core::{
    ConversionOptions, ConvertErrorKind, Converter, Policy, UpAxis, WarningKind,
};

fn strict() -> ConversionOptions {
    ConversionOptions {
        policy: Policy::Strict,
        ..ConversionOptions::default()
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn test_layered_output_tree() {
    let temp = TempDir::new().unwrap();
    write_file(temp.path(), "meshes/base.stl", triangle_at(0.0));
    let source = write_file(
        temp.path(),
        "arm.urdf",
        chain_urdf("arm", &[("base", &mesh("meshes/base.stl")), ("tip", "")]),
    );
    let out = temp.path().join("out");

    let report = Converter::default().convert(&source, &out).unwrap();

    let asset = out.join("arm");
    assert_eq!(report.asset_path, asset.join("arm.usda"));
    for layer in [
        "arm.usda",
        "Payload/Contents.usda",
        "Payload/Geometry.usda",
        "Payload/Materials.usda",
        "Payload/Physics.usda",
        "Resources/GeometryLibrary.usda",
    ] {
        assert!(asset.join(layer).is_file(), "missing layer {}", layer);
    }

    let root = read(&report.asset_path);
    assert!(root.contains("defaultPrim = \"arm\""));
    assert!(root.contains("upAxis = \"Z\""));
    assert!(root.contains("metersPerUnit = 1"));
    assert!(root.contains("kind = \"component\""));
    assert!(root.contains("prepend payload = @./Payload/Contents.usda@"));
    assert!(root.contains("def PhysicsScene \"PhysicsScene\""));

    let contents = read(&asset.join("Payload/Contents.usda"));
    assert!(contents.contains("@./Physics.usda@"));
    assert!(contents.contains("@./Materials.usda@"));
    assert!(contents.contains("@./Geometry.usda@"));

    assert_eq!(report.links, 2);
    assert_eq!(report.joints, 1);
    assert_eq!(report.meshes_decoded, 1);
    assert_eq!(report.meshes_authored, 1);
    assert!(report.warnings.is_empty());
}

#[test]
fn test_lenient_missing_mesh_drops_geometry() {
    let temp = TempDir::new().unwrap();
    write_file(temp.path(), "meshes/base.stl", triangle_at(0.0));
    let source = write_file(
        temp.path(),
        "bot.urdf",
        chain_urdf(
            "bot",
            &[
                ("base", &mesh("meshes/base.stl")),
                ("arm", &mesh("meshes/missing_arm.stl")),
            ],
        ),
    );

    let report = Converter::default()
        .convert(&source, temp.path().join("out"))
        .unwrap();

    assert_eq!(report.warnings.len(), 1);
    let warning = &report.warnings[0];
    assert_eq!(warning.kind, WarningKind::ResourceNotFound);
    assert_eq!(warning.subject, "arm");
    assert!(warning.message.contains("meshes/missing_arm.stl"));

    // the link survives without its visual
    assert_eq!(report.links, 2);
    assert_eq!(report.meshes_authored, 1);
    let geometry = read(&temp.path().join("out/bot/Payload/Geometry.usda"));
    assert!(geometry.contains("def Xform \"arm\""));
    assert!(!geometry.contains("missing_arm"));
}

#[test]
fn test_strict_missing_mesh_fails_without_output() {
    let temp = TempDir::new().unwrap();
    let source = write_file(
        temp.path(),
        "bot.urdf",
        chain_urdf("bot", &[("base", &mesh("meshes/missing.stl"))]),
    );
    let out = temp.path().join("out");

    let error = Converter::new(strict()).convert(&source, &out).unwrap_err();

    match &error.kind {
        ConvertErrorKind::ResourceNotFound(missing) => {
            assert_eq!(missing.reference, "meshes/missing.stl");
            assert!(!missing.candidates.is_empty());
        }
        other => panic!("expected ResourceNotFound, got {:?}", other),
    }
    assert_eq!(error.path, source);
    assert!(!out.exists());
}

#[test]
fn test_cyclic_joints_fail_without_output() {
    let temp = TempDir::new().unwrap();
    let source = write_file(
        temp.path(),
        "loop.urdf",
        r#"<robot name="loop">
             <link name="a"/>
             <link name="b"/>
             <joint name="ab" type="fixed"><parent link="a"/><child link="b"/></joint>
             <joint name="ba" type="fixed"><parent link="b"/><child link="a"/></joint>
           </robot>"#,
    );
    let out = temp.path().join("out");

    let error = Converter::default().convert(&source, &out).unwrap_err();

    match &error.kind {
        ConvertErrorKind::Kinematic(kinematic) => assert!(kinematic.is_cycle_related()),
        other => panic!("expected a kinematic error, got {:?}", other),
    }
    assert!(!out.exists());
}

#[test]
fn test_shared_mesh_authored_once() {
    let temp = TempDir::new().unwrap();
    write_file(temp.path(), "meshes/wheel.stl", triangle_at(0.0));
    let source = write_file(
        temp.path(),
        "cart.urdf",
        chain_urdf(
            "cart",
            &[
                ("chassis", ""),
                ("left_wheel", &mesh("meshes/wheel.stl")),
                ("right_wheel", &mesh("meshes/wheel.stl")),
            ],
        ),
    );

    let report = Converter::default()
        .convert(&source, temp.path().join("out"))
        .unwrap();
    assert_eq!(report.meshes_decoded, 1);
    assert_eq!(report.meshes_authored, 1);

    let asset = temp.path().join("out/cart");
    let library = read(&asset.join("Resources/GeometryLibrary.usda"));
    assert_eq!(library.matches("def Mesh ").count(), 1);
    assert!(library.contains("def Mesh \"wheel\""));

    let geometry = read(&asset.join("Payload/Geometry.usda"));
    assert_eq!(
        geometry
            .matches("@../Resources/GeometryLibrary.usda@</Meshes/wheel>")
            .count(),
        2
    );
}

#[test]
fn test_identical_mesh_files_share_one_prim() {
    let temp = TempDir::new().unwrap();
    write_file(temp.path(), "a/part.stl", triangle_at(2.0));
    write_file(temp.path(), "b/copy.stl", triangle_at(2.0));
    let source = write_file(
        temp.path(),
        "bot.urdf",
        chain_urdf(
            "bot",
            &[("one", &mesh("a/part.stl")), ("two", &mesh("b/copy.stl"))],
        ),
    );

    let report = Converter::default()
        .convert(&source, temp.path().join("out"))
        .unwrap();
    assert_eq!(report.meshes_decoded, 2);
    assert_eq!(report.meshes_authored, 1);
}

#[test]
fn test_explicit_package_mapping() {
    let temp = TempDir::new().unwrap();
    let package_root = temp.path().join("elsewhere/gripper_description");
    write_file(&package_root, "meshes/finger.stl", triangle_at(0.0));
    let source = write_file(
        temp.path(),
        "robot/gripper.urdf",
        chain_urdf(
            "gripper",
            &[("finger", &mesh("package://gripper_description/meshes/finger.stl"))],
        ),
    );

    let unmapped = Converter::new(strict())
        .convert(&source, temp.path().join("unmapped"))
        .unwrap_err();
    assert!(matches!(
        unmapped.kind,
        ConvertErrorKind::ResourceNotFound(_)
    ));

    let mut options = strict();
    options
        .add_package_argument(&format!("gripper_description={}", package_root.display()))
        .unwrap();
    let report = Converter::new(options)
        .convert(&source, temp.path().join("mapped"))
        .unwrap();
    assert_eq!(report.meshes_authored, 1);
    assert!(report.warnings.is_empty());
}

#[test]
fn test_nearest_ancestor_package_wins() {
    let temp = TempDir::new().unwrap();
    // far copy at the workspace root, near copy next to the description
    write_file(temp.path(), "my_robot/meshes/body.stl", triangle_at(7.0));
    write_file(temp.path(), "ws/src/my_robot/meshes/body.stl", triangle_at(3.0));
    let source = write_file(
        temp.path(),
        "ws/src/my_robot/urdf/robot.urdf",
        chain_urdf(
            "robot",
            &[("body", &mesh("package://my_robot/meshes/body.stl"))],
        ),
    );

    let report = Converter::new(strict())
        .convert(&source, temp.path().join("out"))
        .unwrap();
    assert_eq!(report.meshes_authored, 1);

    let library = read(&temp.path().join("out/robot/Resources/GeometryLibrary.usda"));
    assert!(library.contains("(3, 0, 0)"));
    assert!(!library.contains("(7, 0, 0)"));
}

#[test]
fn test_physics_layer_holds_links_and_joints() {
    let temp = TempDir::new().unwrap();
    let source = write_file(
        temp.path(),
        "chain.urdf",
        chain_urdf(
            "chain",
            &[
                ("l0", "<box size=\"1 1 1\"/>"),
                ("l1", "<sphere radius=\"0.2\"/>"),
                ("l2", "<cylinder radius=\"0.1\" length=\"0.5\"/>"),
                ("l3", ""),
            ],
        ),
    );

    let report = Converter::default()
        .convert(&source, temp.path().join("out"))
        .unwrap();
    let physics = read(&temp.path().join("out/chain/Payload/Physics.usda"));

    // robot, Geometry and the joint scope are containers
    assert_eq!(prim_spec_count(&physics) - 3, report.links + report.joints);
    assert_eq!(physics.matches("def PhysicsRevoluteJoint ").count(), 3);
    assert!(physics.contains("PhysicsArticulationRootAPI"));
    assert!(physics.contains("float physics:lowerLimit = -89.95"));

    // appearance and physics stay out of the geometry layer
    let geometry = read(&temp.path().join("out/chain/Payload/Geometry.usda"));
    assert!(!geometry.contains("PhysicsRevoluteJoint"));
    assert!(!geometry.contains("material:binding"));
}

#[test]
fn test_collision_schemas_live_in_physics_layer() {
    let temp = TempDir::new().unwrap();
    let source = write_file(
        temp.path(),
        "boxed.urdf",
        r#"<robot name="boxed">
             <link name="base">
               <collision><geometry><box size="1 1 1"/></geometry></collision>
             </link>
           </robot>"#,
    );

    let report = Converter::default()
        .convert(&source, temp.path().join("out"))
        .unwrap();
    let geometry = read(&temp.path().join("out/boxed/Payload/Geometry.usda"));
    let physics = read(&temp.path().join("out/boxed/Payload/Physics.usda"));

    assert!(geometry.contains("uniform token purpose = \"guide\""));
    assert!(!geometry.contains("PhysicsCollisionAPI"));
    assert!(!geometry.contains("physics:"));
    assert!(physics.contains("PhysicsCollisionAPI"));
    assert!(physics.contains("over \"collision\""));
    assert!(physics.contains("bool physics:collisionEnabled = 1"));
    // links + joints + one collision + containers
    assert_eq!(prim_spec_count(&physics), report.links + report.joints + 1 + 3);
}

#[test]
fn test_unknown_description_data_is_preserved() {
    let temp = TempDir::new().unwrap();
    let source = write_file(
        temp.path(),
        "tagged.urdf",
        r#"<robot name="tagged" generator="cad">
             <material name="paint" finish="matte"><color rgba="1 0 0 1"/></material>
             <link name="base">
               <visual><geometry><sphere radius="1"/></geometry><material name="paint"/></visual>
               <gazebo reference="base"><mu1>0.5</mu1></gazebo>
             </link>
             <link name="tip"/>
             <joint name="fix" type="fixed" bus="can0">
               <parent link="base"/><child link="tip"/>
             </joint>
             <transmission name="t1"><type>simple</type></transmission>
           </robot>"#,
    );

    Converter::new(strict())
        .convert(&source, temp.path().join("out"))
        .unwrap();
    let payload = temp.path().join("out/tagged/Payload");
    let geometry = read(&payload.join("Geometry.usda"));
    let materials = read(&payload.join("Materials.usda"));
    let physics = read(&payload.join("Physics.usda"));

    assert!(geometry.contains("def Scope \"gazebo\""));
    assert!(geometry.contains("custom string urdf:reference = \"base\""));
    assert!(geometry.contains("custom string urdf:text = \"0.5\""));
    assert!(geometry.contains("def Scope \"custom\""));
    assert!(geometry.contains("custom string urdf:generator = \"cad\""));
    assert!(geometry.contains("def Scope \"transmission\""));
    assert!(geometry.contains("custom string urdf:name = \"t1\""));
    assert!(materials.contains("custom string urdf:finish = \"matte\""));
    assert!(physics.contains("custom string urdf:bus = \"can0\""));
}

#[test]
fn test_undefined_material_fails_without_output() {
    let temp = TempDir::new().unwrap();
    let source = write_file(
        temp.path(),
        "bare.urdf",
        r#"<robot name="bare">
             <link name="base">
               <visual><geometry><sphere radius="1"/></geometry><material name="ghost"/></visual>
             </link>
           </robot>"#,
    );

    let err = Converter::default()
        .convert(&source, temp.path().join("out"))
        .unwrap_err();
    assert!(matches!(err.kind, ConvertErrorKind::Parse(_)));
    assert!(!temp.path().join("out/bare").exists());
}

#[test]
fn test_asset_is_self_contained() {
    let temp = TempDir::new().unwrap();
    let sources = temp.path().join("src");
    write_file(&sources, "meshes/panel.obj", TEXTURED_QUAD_OBJ);
    write_file(&sources, "meshes/panel.mtl", PANEL_MTL);
    write_file(&sources, "meshes/panel.png", b"\x89PNG fake");
    write_file(&sources, "meshes/wheel.stl", triangle_at(0.0));
    write_file(&sources, "textures/logo.png", b"\x89PNG logo");
    let source = write_file(
        &sources,
        "bot.urdf",
        r#"<robot name="bot">
             <material name="branded">
               <color rgba="1 1 1 1"/>
               <texture filename="textures/logo.png"/>
             </material>
             <link name="base">
               <visual><geometry><mesh filename="meshes/panel.obj"/></geometry></visual>
               <collision><geometry><mesh filename="meshes/wheel.stl"/></geometry></collision>
             </link>
             <link name="cover">
               <visual>
                 <geometry><box size="0.1 0.1 0.1"/></geometry>
                 <material name="branded"/>
               </visual>
             </link>
             <joint name="mount" type="fixed">
               <parent link="base"/><child link="cover"/>
             </joint>
           </robot>"#,
    );
    let out = temp.path().join("out");

    let report = Converter::default().convert(&source, &out).unwrap();
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(report.textures_copied, 2);

    fs::remove_dir_all(&sources).unwrap();

    let asset = out.join("bot");
    let layers = layer_files(&asset);
    assert_eq!(layers.len(), 6);
    for layer in &layers {
        let text = read(layer);
        let dir = layer.parent().unwrap();
        for path in asset_paths(&text) {
            assert!(
                !Path::new(&path).is_absolute(),
                "absolute asset path {} in {}",
                path,
                layer.display()
            );
            assert!(
                dir.join(&path).is_file(),
                "{} in {} does not resolve",
                path,
                layer.display()
            );
        }
    }
    assert!(asset.join("Resources/Textures/panel.png").is_file());
    assert!(asset.join("Resources/Textures/logo.png").is_file());
}

#[test]
fn test_two_destinations_are_independent() {
    let temp = TempDir::new().unwrap();
    write_file(temp.path(), "meshes/base.stl", triangle_at(0.0));
    let source = write_file(
        temp.path(),
        "bot.urdf",
        chain_urdf("bot", &[("base", &mesh("meshes/base.stl"))]),
    );

    let converter = Converter::default();
    let first = converter.convert(&source, temp.path().join("a")).unwrap();
    let second = converter.convert(&source, temp.path().join("b")).unwrap();

    assert_ne!(first.asset_path, second.asset_path);
    let first_dir = first.asset_path.parent().unwrap();
    let second_dir = second.asset_path.parent().unwrap();
    for layer in ["bot.usda", "Payload/Geometry.usda", "Resources/GeometryLibrary.usda"] {
        assert_eq!(read(&first_dir.join(layer)), read(&second_dir.join(layer)));
    }

    fs::remove_dir_all(first_dir).unwrap();
    assert!(second.asset_path.is_file());
}

#[test]
fn test_y_up_stage_conversion() {
    let temp = TempDir::new().unwrap();
    let source = write_file(
        temp.path(),
        "bot.urdf",
        chain_urdf("bot", &[("base", "<box size=\"1 1 1\"/>")]),
    );
    let options = ConversionOptions {
        up_axis: UpAxis::Y,
        meters_per_unit: 0.01,
        physics_scene: false,
        output_name: Some("bot_cm".to_string()),
        ..ConversionOptions::default()
    };

    let report = Converter::new(options)
        .convert(&source, temp.path().join("out"))
        .unwrap();
    assert!(report.asset_path.ends_with("bot_cm/bot_cm.usda"));

    let root = read(&report.asset_path);
    assert!(root.contains("upAxis = \"Y\""));
    assert!(root.contains("metersPerUnit = 0.01"));
    assert!(root.contains("xformOp:orient"));
    assert!(root.contains("xformOp:scale = (100, 100, 100)"));
    assert!(!root.contains("PhysicsScene"));

    // payload layers keep the description's convention
    let geometry = read(&report.asset_path.with_file_name("Payload/Geometry.usda"));
    assert!(geometry.contains("upAxis = \"Z\""));
    assert!(geometry.contains("metersPerUnit = 1"));
}

#[test]
fn test_corrupt_mesh_is_dropped_once() {
    let temp = TempDir::new().unwrap();
    let mut bytes = binary_stl(&[[[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]]);
    bytes[80..84].copy_from_slice(&9u32.to_le_bytes());
    write_file(temp.path(), "meshes/bad.stl", bytes);
    let source = write_file(
        temp.path(),
        "bot.urdf",
        chain_urdf(
            "bot",
            &[
                ("one", &mesh("meshes/bad.stl")),
                ("two", &mesh("meshes/bad.stl")),
            ],
        ),
    );

    let report = Converter::default()
        .convert(&source, temp.path().join("out"))
        .unwrap();
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].kind, WarningKind::MeshDecode);
    assert_eq!(report.meshes_decoded, 0);
    assert!(!temp
        .path()
        .join("out/bot/Resources/GeometryLibrary.usda")
        .exists());
}
