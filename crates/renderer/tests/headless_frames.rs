use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, Sender};
use renderer::gpu::headless::FrameRecord;
use renderer::gpu::{UniformLocation, UniformValue};
use renderer::types::Uniform;
use renderer::{
    CelestialBody, DecodedImage, HeadlessBackend, ImageSource, InputCommand, LoadStatus,
    RenderError, Renderer, ShaderSources, StageKind, TextureManifest, BODY_COUNT,
    PLACEHOLDER_PIXEL,
};

const PASS_THROUGH_VERTEX: &str = r"
layout(location = 0) in vec2 a_position;
void main() {
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

const SOLID_FRAGMENT: &str = r"
layout(location = 0) out vec4 fragColor;
void main() {
    fragColor = vec4(1.0, 0.5, 0.0, 1.0);
}
";

const UV_VERTEX: &str = r"
layout(location = 0) in vec2 a_position;
layout(location = 1) in vec2 a_uv;
layout(location = 0) out vec2 v_uv;
void main() {
    v_uv = a_uv;
    gl_Position = vec4(a_position * u_zoom, 0.0, 1.0);
}
";

/// Samples every body so all ten sampler uniforms stay active.
const ALL_BODIES_FRAGMENT: &str = r"
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 fragColor;
void main() {
    vec4 color = texture(u_texture_earth, v_uv)
        + texture(u_texture_mars, v_uv)
        + texture(u_texture_jupiter, v_uv)
        + texture(u_texture_mercury, v_uv)
        + texture(u_texture_neptune, v_uv)
        + texture(u_texture_saturn, v_uv)
        + texture(u_texture_uranus, v_uv)
        + texture(u_texture_venus, v_uv)
        + texture(u_texture_sun, v_uv)
        + texture(u_texture_stars, v_uv);
    float t = u_time + u_dt + float(u_starMode + u_orbit);
    fragColor = vec4(color.rgb * 0.1 + vec3(u_mouse, t) / u_resolution.x, 1.0);
}
";

/// Hands out a red 4x2 image once the gate opens.
struct GatedImages {
    gate: Receiver<()>,
}

impl GatedImages {
    fn new() -> (Self, Sender<()>) {
        let (open, gate) = bounded(0);
        (Self { gate }, open)
    }
}

impl ImageSource for GatedImages {
    fn fetch(&self, _id: &str) -> Result<DecodedImage> {
        // Dropping the sender releases every waiting decode at once.
        let _ = self.gate.recv();
        Ok(DecodedImage {
            width: 4,
            height: 2,
            pixels: [200u8, 0, 0, 255].repeat(8),
        })
    }
}

fn start(
    vertex: &str,
    fragment: &str,
) -> (Result<Renderer<HeadlessBackend>, RenderError>, Sender<()>) {
    let (images, open) = GatedImages::new();
    let renderer = Renderer::initialize(
        HeadlessBackend::new(640, 360),
        &ShaderSources::new(vertex, fragment),
        Arc::new(images),
        &TextureManifest::conventional(),
    );
    (renderer, open)
}

fn last_frame(renderer: &Renderer<HeadlessBackend>) -> &FrameRecord {
    renderer.backend().last_frame().expect("a recorded frame")
}

#[test]
fn one_frame_issues_one_six_index_draw() {
    let (renderer, _open) = start(PASS_THROUGH_VERTEX, SOLID_FRAGMENT);
    let mut renderer = renderer.expect("minimal shaders initialise");
    renderer.render_frame().expect("frame");

    let frame = last_frame(&renderer);
    assert_eq!(frame.draws.len(), 1);
    let draw = &frame.draws[0];
    assert_eq!(draw.index_count, 6);
    assert_eq!(draw.program, Some(renderer.program().id()));
    assert_eq!(draw.mesh, Some(renderer.mesh().id()));
    assert_eq!(frame.viewport, Some((640, 360)));
    assert_eq!(frame.clear, Some([0.0, 0.0, 0.0, 1.0]));
    assert!(frame.mesh_released);
    // The solid fragment reads no uniform, so nothing was written.
    assert!(frame.uniforms.is_empty());
    assert_eq!(renderer.frames_rendered(), 1);
}

#[test]
fn only_read_uniforms_are_written() {
    let fragment = r"
layout(location = 0) out vec4 fragColor;
void main() {
    fragColor = vec4(u_zoom, 0.0, 0.0, 1.0);
}
";
    let (renderer, _open) = start(PASS_THROUGH_VERTEX, fragment);
    let mut renderer = renderer.expect("initialise");
    let locations = renderer.program().locations();
    assert_eq!(
        locations.uniform(Uniform::Zoom),
        Some(UniformLocation::Block { offset: 24 })
    );
    for uniform in Uniform::ALL.into_iter().filter(|u| *u != Uniform::Zoom) {
        assert_eq!(locations.uniform(uniform), None, "{}", uniform.name());
    }

    renderer.render_frame().expect("frame");
    let frame = last_frame(&renderer);
    assert_eq!(
        frame.uniforms,
        vec![(UniformLocation::Block { offset: 24 }, UniformValue::Float(1.0))]
    );
    assert!(frame.sampler_units.is_empty());
}

#[test]
fn initialise_keeps_only_program_textures_and_mesh() {
    let (renderer, _open) = start(UV_VERTEX, ALL_BODIES_FRAGMENT);
    let renderer = renderer.expect("initialise");
    let backend = renderer.backend();
    assert_eq!(backend.live_shaders(), 0);
    assert_eq!(backend.live_programs(), 1);
    assert_eq!(backend.live_textures(), BODY_COUNT);
    assert_eq!(backend.live_meshes(), 1);
}

#[test]
fn placeholder_is_bound_until_decode_completes() {
    let (renderer, open) = start(UV_VERTEX, ALL_BODIES_FRAGMENT);
    let mut renderer = renderer.expect("initialise");
    assert!(renderer
        .textures()
        .iter()
        .all(|texture| texture.status() == LoadStatus::Loading));

    renderer.pump_texture_loads();
    renderer.render_frame().expect("frame");
    let earth = renderer.textures().get(CelestialBody::Earth).id();
    let draw = &last_frame(&renderer).draws[0];
    assert_eq!(draw.textures.get(&0), Some(&earth));
    let levels = renderer.backend().texture_levels(earth).expect("levels");
    assert_eq!(levels.len(), 1);
    assert_eq!((levels[0].width, levels[0].height), (1, 1));
    assert_eq!(levels[0].pixel(0, 0), Some(PLACEHOLDER_PIXEL));

    drop(open);
    assert!(renderer.wait_for_texture_loads(Duration::from_secs(10)));
    renderer.render_frame().expect("frame");

    for texture in renderer.textures().iter() {
        assert_eq!(texture.status(), LoadStatus::Ready, "{}", texture.body());
    }
    let levels = renderer.backend().texture_levels(earth).expect("levels");
    let sizes: Vec<_> = levels.iter().map(|l| (l.width, l.height)).collect();
    assert_eq!(sizes, vec![(4, 2), (2, 1), (1, 1)]);
    assert_eq!(levels[0].pixel(3, 1), Some([200, 0, 0, 255]));
}

#[test]
fn sampler_units_are_stable_across_frames() {
    let (renderer, _open) = start(UV_VERTEX, ALL_BODIES_FRAGMENT);
    let mut renderer = renderer.expect("initialise");
    renderer.render_frame().expect("first frame");
    let first = last_frame(&renderer).clone();
    renderer.render_frame().expect("second frame");
    let second = last_frame(&renderer).clone();

    assert_eq!(first.sampler_units, second.sampler_units);
    assert_eq!(first.units, second.units);
    assert_eq!(first.sampler_units.len(), BODY_COUNT);
    for body in CelestialBody::ALL {
        assert_eq!(first.sampler_units.get(&body.unit()), Some(&body.unit()));
        assert_eq!(
            first.units.get(&body.unit()),
            Some(&renderer.textures().get(body).id())
        );
    }
}

#[test]
fn uniforms_follow_state_and_surface() {
    let (renderer, _open) = start(UV_VERTEX, ALL_BODIES_FRAGMENT);
    let mut renderer = renderer.expect("initialise");
    let zoom = renderer
        .program()
        .locations()
        .uniform(renderer::types::Uniform::Zoom)
        .expect("zoom is used");
    let resolution = renderer
        .program()
        .locations()
        .uniform(renderer::types::Uniform::Resolution)
        .expect("resolution is used");

    renderer.state_mut().adjust_zoom(100.0);
    renderer.apply(InputCommand::ToggleOrbit);
    renderer.backend_mut().set_drawable_size(800, 600);
    renderer.render_frame().expect("frame");

    let frame = last_frame(&renderer);
    assert_eq!(frame.viewport, Some((800, 600)));
    let UniformLocation::Block { offset } = zoom else {
        panic!("zoom lives in the uniform block");
    };
    assert_eq!(frame.block_value(offset), Some(UniformValue::Float(5.0)));
    let UniformLocation::Block { offset } = resolution else {
        panic!("resolution lives in the uniform block");
    };
    assert_eq!(
        frame.block_value(offset),
        Some(UniformValue::Vec2([800.0, 600.0]))
    );

    renderer.apply(InputCommand::ResetView);
    renderer.render_frame().expect("frame");
    assert_eq!(renderer.state().zoom(), 1.0);
    assert_eq!(renderer.state().pointer(), [0.0, 0.0]);
    let UniformLocation::Block { offset } = zoom else {
        unreachable!();
    };
    assert_eq!(
        last_frame(&renderer).block_value(offset),
        Some(UniformValue::Float(1.0))
    );
}

#[test]
fn compile_failure_prevents_start() {
    let (renderer, _open) = start(PASS_THROUGH_VERTEX, "void main() { fragColor = ; }");
    match renderer {
        Err(RenderError::Compile { stage, log }) => {
            assert_eq!(stage, StageKind::Fragment);
            assert!(log.contains("fragment.glsl"), "{log}");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("a broken fragment shader must not start"),
    }
}

#[test]
fn link_failure_prevents_start() {
    let fragment = r"
layout(location = 2) in vec3 v_normal;
layout(location = 0) out vec4 fragColor;
void main() { fragColor = vec4(v_normal, 1.0); }
";
    let (renderer, _open) = start(PASS_THROUGH_VERTEX, fragment);
    let Err(err) = renderer else {
        panic!("an unwritten fragment input must not start");
    };
    assert!(matches!(err, RenderError::Link { .. }));
    assert!(err.log().contains("location 2"), "{}", err.log());
}

#[test]
fn failed_begin_frame_skips_the_tick() {
    let (renderer, _open) = start(PASS_THROUGH_VERTEX, SOLID_FRAGMENT);
    let mut renderer = renderer.expect("initialise");
    renderer
        .backend_mut()
        .fail_next_frame(renderer::FrameError::Timeout);
    assert!(renderer.render_frame().is_err());
    assert_eq!(renderer.frames_rendered(), 0);
    assert_eq!(renderer.clock().time(), 0.0);

    renderer.render_frame().expect("recovers");
    assert_eq!(renderer.backend().frames_completed(), 1);
}
