use std::collections::{BTreeMap, BTreeSet};

use wgpu::naga::{
    self,
    front::glsl::{Frontend, Options},
    valid::{Capabilities, FunctionInfo, ModuleInfo, ValidationFlags, Validator},
    AddressSpace, Binding, Expression, Handle, Module, ShaderStage, TypeInner,
};

use crate::gpu::UniformLocation;
use crate::types::{CelestialBody, StageKind, Uniform};

/// Descriptor set holding the scalar uniform block.
const UNIFORM_GROUP: u32 = 0;
/// Descriptor set holding one texture/sampler pair per body.
const TEXTURE_GROUP: u32 = 1;
const BLOCK_PREFIX: char = '_';

/// A stage that parsed and validated successfully.
#[derive(Debug, Clone)]
pub(crate) struct CompiledStage {
    pub kind: StageKind,
    pub module: Module,
    pub info: ModuleInfo,
    /// Author source, kept so linking can rebuild the stage with new locations.
    pub source: String,
    pub varyings: StageVaryings,
}

/// Interstage variables of one stage: outputs of a vertex stage or inputs of
/// a fragment stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct StageVaryings {
    pub locations: BTreeMap<String, u32>,
    /// Names declared without `layout(location)`.
    pub implicit: BTreeSet<String>,
}

/// Interface of a linked program, resolved once right after linking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ProgramInterface {
    pub attributes: BTreeMap<String, u32>,
    pub uniforms: BTreeMap<String, u32>,
    pub samplers: BTreeMap<String, u32>,
    /// Size in bytes of the std140 uniform block, zero when no stage declares it.
    pub uniform_block_size: u32,
}

impl ProgramInterface {
    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.attributes.get(name).copied()
    }

    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        if let Some(offset) = self.uniforms.get(name) {
            return Some(UniformLocation::Block { offset: *offset });
        }
        self.samplers
            .get(name)
            .map(|slot| UniformLocation::Sampler { slot: *slot })
    }
}

/// Outcome of a successful link.
#[derive(Debug)]
pub(crate) struct LinkedStages {
    pub interface: ProgramInterface,
    /// Fragment stage rebuilt so its implicitly placed inputs match the
    /// locations the vertex stage writes under the same names. `None` when
    /// the compiled fragment stage already lines up.
    pub relocated_fragment: Option<CompiledStage>,
}

/// Wraps, parses and validates one stage. `Err` carries the diagnostic log.
pub(crate) fn compile_stage(kind: StageKind, source: &str) -> Result<CompiledStage, String> {
    compile_with(kind, source, &BTreeMap::new())
}

fn compile_with(
    kind: StageKind,
    source: &str,
    linked: &BTreeMap<String, u32>,
) -> Result<CompiledStage, String> {
    let wrapped = wrap_stage(kind, source, linked)?;
    let path = format!("{kind}.glsl");
    let mut frontend = Frontend::default();
    let module = frontend
        .parse(&Options::from(naga_stage(kind)), &wrapped.text)
        .map_err(|errors| {
            let mut writer = termcolor::NoColor::new(Vec::new());
            errors.emit_to_writer_with_path(&mut writer, &wrapped.text, path.as_str());
            String::from_utf8_lossy(&writer.into_inner()).into_owned()
        })?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    let info = validator
        .validate(&module)
        .map_err(|error| error.emit_to_string_with_path(&wrapped.text, path.as_str()))?;

    if entry_point_index(&module, naga_stage(kind)).is_none() {
        return Err(format!("{kind} shader declares no `main` entry point"));
    }

    Ok(CompiledStage {
        kind,
        module,
        info,
        source: source.to_string(),
        varyings: wrapped.varyings,
    })
}

/// Checks that two stages form a usable program and reflects its interface.
///
/// Fragment inputs with an explicit location match vertex outputs by
/// location; implicitly placed ones match by name, and the fragment stage is
/// rebuilt when the two sides disagree on where a name lives.
pub(crate) fn link_stages(
    vertex: &CompiledStage,
    fragment: &CompiledStage,
) -> Result<LinkedStages, String> {
    if vertex.kind != StageKind::Vertex {
        return Err(format!("expected a vertex stage, got a {} stage", vertex.kind));
    }
    if fragment.kind != StageKind::Fragment {
        return Err(format!(
            "expected a fragment stage, got a {} stage",
            fragment.kind
        ));
    }
    let relocated_fragment = relocate_fragment(vertex, fragment)?;
    let fragment = relocated_fragment.as_ref().unwrap_or(fragment);

    let vs_index = entry_point_index(&vertex.module, ShaderStage::Vertex)
        .ok_or_else(|| "vertex stage has no vertex entry point".to_string())?;
    let fs_index = entry_point_index(&fragment.module, ShaderStage::Fragment)
        .ok_or_else(|| "fragment stage has no fragment entry point".to_string())?;

    let written = vertex_output_locations(&vertex.module, vs_index);
    let mut missing = Vec::new();
    for (name, location) in entry_inputs(&fragment.module, fs_index) {
        if !written.contains(&location) {
            missing.push(format!("`{name}` (location {location})"));
        }
    }
    if !missing.is_empty() {
        return Err(format!(
            "fragment inputs not written by the vertex stage: {}",
            missing.join(", ")
        ));
    }

    let mut interface = ProgramInterface {
        attributes: entry_inputs(&vertex.module, vs_index).into_iter().collect(),
        ..ProgramInterface::default()
    };
    for stage in [vertex, fragment] {
        reflect_uniforms(stage, &mut interface);
    }
    reflect_samplers(fragment, fs_index, &mut interface);
    Ok(LinkedStages {
        interface,
        relocated_fragment,
    })
}

fn relocate_fragment(
    vertex: &CompiledStage,
    fragment: &CompiledStage,
) -> Result<Option<CompiledStage>, String> {
    let mut unmatched = Vec::new();
    let mut moved = false;
    for name in &fragment.varyings.implicit {
        match vertex.varyings.locations.get(name) {
            Some(location) => moved |= fragment.varyings.locations.get(name) != Some(location),
            None => unmatched.push(format!("`{name}`")),
        }
    }
    if !unmatched.is_empty() {
        return Err(format!(
            "fragment inputs not written by the vertex stage: {}",
            unmatched.join(", ")
        ));
    }
    if !moved {
        return Ok(None);
    }
    compile_with(
        StageKind::Fragment,
        &fragment.source,
        &vertex.varyings.locations,
    )
    .map(Some)
    .map_err(|log| format!("fragment stage failed to rebuild with vertex output locations:\n{log}"))
}

fn naga_stage(kind: StageKind) -> ShaderStage {
    match kind {
        StageKind::Vertex => ShaderStage::Vertex,
        StageKind::Fragment => ShaderStage::Fragment,
    }
}

fn entry_point_index(module: &Module, stage: ShaderStage) -> Option<usize> {
    module
        .entry_points
        .iter()
        .position(|entry| entry.stage == stage)
}

fn entry_inputs(module: &Module, index: usize) -> Vec<(String, u32)> {
    module.entry_points[index]
        .function
        .arguments
        .iter()
        .filter_map(|argument| match argument.binding {
            Some(Binding::Location { location, .. }) => Some((
                argument
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("location{location}")),
                location,
            )),
            _ => None,
        })
        .collect()
}

fn vertex_output_locations(module: &Module, index: usize) -> BTreeSet<u32> {
    let mut locations = BTreeSet::new();
    let Some(result) = &module.entry_points[index].function.result else {
        return locations;
    };
    if let Some(Binding::Location { location, .. }) = result.binding {
        locations.insert(location);
    }
    if let TypeInner::Struct { members, .. } = &module.types[result.ty].inner {
        for member in members {
            if let Some(Binding::Location { location, .. }) = member.binding {
                locations.insert(location);
            }
        }
    }
    locations
}

/// Every function body of `stage` with its validator analysis, entry points
/// included.
fn function_bodies<'a>(
    stage: &'a CompiledStage,
) -> impl Iterator<Item = (&'a naga::Function, &'a FunctionInfo)> {
    let module = &stage.module;
    module
        .functions
        .iter()
        .map(|(handle, function)| (function, &stage.info[handle]))
        .chain(
            module
                .entry_points
                .iter()
                .enumerate()
                .map(|(index, entry)| (&entry.function, stage.info.get_entry_point(index))),
        )
}

/// Records the block members `stage` reads. A block the entry point never
/// touches contributes nothing.
fn reflect_uniforms(stage: &CompiledStage, interface: &mut ProgramInterface) {
    let module = &stage.module;
    let Some(index) = entry_point_index(module, naga_stage(stage.kind)) else {
        return;
    };
    let entry_info = stage.info.get_entry_point(index);
    for (handle, global) in module.global_variables.iter() {
        if global.space != AddressSpace::Uniform {
            continue;
        }
        if global.binding.as_ref().map(|b| b.group) != Some(UNIFORM_GROUP) {
            continue;
        }
        let TypeInner::Struct { members, span } = &module.types[global.ty].inner else {
            continue;
        };
        interface.uniform_block_size = interface.uniform_block_size.max(*span);
        if entry_info[handle].is_empty() {
            continue;
        }

        let read = members_read(stage, handle);
        for (member_index, member) in members.iter().enumerate() {
            let Some(name) = member.name.as_deref() else {
                continue;
            };
            if read
                .as_ref()
                .is_some_and(|fields| !fields.contains(&(member_index as u32)))
            {
                continue;
            }
            let name = name.strip_prefix(BLOCK_PREFIX).unwrap_or(name);
            interface.uniforms.insert(name.to_string(), member.offset);
        }
    }
}

/// Field indices read through `global`, or `None` when the block is used as
/// a whole. Only member accesses something consumes count: the GLSL frontend
/// emits one for every field of the block in each function up front.
fn members_read(
    stage: &CompiledStage,
    global: Handle<naga::GlobalVariable>,
) -> Option<BTreeSet<u32>> {
    let mut fields = BTreeSet::new();
    for (function, info) in function_bodies(stage) {
        let expressions = &function.expressions;
        let mut roots: Vec<Handle<Expression>> = Vec::new();
        for (handle, expression) in expressions.iter() {
            match *expression {
                Expression::GlobalVariable(var) if var == global => roots.push(handle),
                Expression::Load { pointer } if roots.contains(&pointer) => roots.push(handle),
                _ => {}
            }
        }
        if roots.is_empty() {
            continue;
        }

        let mut consumers = vec![0usize; roots.len()];
        for (handle, expression) in expressions.iter() {
            let base = match *expression {
                Expression::AccessIndex { base, index } if roots.contains(&base) => {
                    if info[handle].ref_count > 0 {
                        fields.insert(index);
                    }
                    base
                }
                Expression::Load { pointer } if roots.contains(&pointer) => pointer,
                _ => continue,
            };
            if let Some(slot) = roots.iter().position(|root| *root == base) {
                consumers[slot] += 1;
            }
        }
        let whole = roots
            .iter()
            .zip(&consumers)
            .any(|(root, count)| info[*root].ref_count > *count);
        if whole {
            return None;
        }
    }
    Some(fields)
}

fn reflect_samplers(fragment: &CompiledStage, index: usize, interface: &mut ProgramInterface) {
    let module = &fragment.module;
    let entry_info = fragment.info.get_entry_point(index);
    for (handle, global) in module.global_variables.iter() {
        let Some(binding) = &global.binding else {
            continue;
        };
        if binding.group != TEXTURE_GROUP || binding.binding % 2 != 0 {
            continue;
        }
        if !matches!(module.types[global.ty].inner, TypeInner::Image { .. }) {
            continue;
        }
        if entry_info[handle].is_empty() || !is_consumed(fragment, handle) {
            continue;
        }
        let slot = binding.binding / 2;
        if let Some(body) = CelestialBody::from_slot(slot) {
            interface.samplers.insert(body.sampler_uniform(), slot);
        }
    }
}

fn is_consumed(stage: &CompiledStage, global: Handle<naga::GlobalVariable>) -> bool {
    function_bodies(stage).any(|(function, info)| {
        function.expressions.iter().any(|(handle, expression)| {
            matches!(*expression, Expression::GlobalVariable(var) if var == global)
                && info[handle].ref_count > 0
        })
    })
}

/// Stage text ready for the GLSL 450 frontend.
#[derive(Debug)]
pub(crate) struct WrappedStage {
    pub text: String,
    pub varyings: StageVaryings,
}

/// Produces self-contained GLSL 450 from an author's stage source.
///
/// `#version` and `precision` statements and loose declarations of the
/// prelude uniforms are blanked, global `in`/`out` declarations without a
/// location get one in declaration order, then the prelude for `kind` is
/// prepended. Fragment inputs named in `linked` take that location instead.
/// Author lines keep their numbers after `#line 1`.
pub(crate) fn wrap_stage(
    kind: StageKind,
    source: &str,
    linked: &BTreeMap<String, u32>,
) -> Result<WrappedStage, String> {
    let lines: Vec<&str> = source.lines().collect();
    let mut declarations = Vec::new();
    let mut depth = 0i32;
    for (index, line) in lines.iter().enumerate() {
        if depth == 0 {
            if let Some(varying) = Varying::parse(line) {
                declarations.push((index, varying));
            }
        }
        depth += brace_delta(line);
    }
    let (placed, varyings) = place_varyings(kind, &declarations, linked);

    let mut body = String::with_capacity(source.len());
    for (index, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        let blanked = trimmed.starts_with("#version") || trimmed.starts_with("precision ");
        if let Some(rendered) = placed.get(&index) {
            body.push_str(rendered);
        } else if let Some(replacement) = reserved_uniform(kind, index + 1, trimmed)? {
            body.push_str(&replacement);
        } else if !blanked {
            body.push_str(line);
        }
        body.push('\n');
    }

    let mut text = String::from(BLOCK_PRELUDE);
    if kind == StageKind::Fragment {
        text.push_str(&texture_prelude());
    }
    text.push_str("#line 1\n");
    text.push_str(&body);
    Ok(WrappedStage { text, varyings })
}

const PRECISION_QUALIFIERS: [&str; 3] = ["highp", "mediump", "lowp"];
const INTERPOLATION_QUALIFIERS: [&str; 6] = [
    "flat",
    "smooth",
    "noperspective",
    "centroid",
    "sample",
    "invariant",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Direction {
    In,
    Out,
}

impl Direction {
    fn keyword(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// A global `in` or `out` declaration of one or more variables.
#[derive(Debug)]
struct Varying {
    direction: Direction,
    location: Option<u32>,
    qualifiers: Vec<String>,
    ty: String,
    /// Declared names, array suffix included.
    names: Vec<String>,
}

impl Varying {
    fn parse(line: &str) -> Option<Self> {
        let statement = strip_comment(line).trim().strip_suffix(';')?.trim_end();
        if statement.contains(';') {
            return None;
        }
        let (location, statement) = match statement.strip_prefix("layout") {
            Some(rest) => {
                let (arguments, rest) = rest.trim_start().strip_prefix('(')?.split_once(')')?;
                (Some(layout_location(arguments)?), rest)
            }
            None => (None, statement),
        };

        let mut direction = None;
        let mut qualifiers = Vec::new();
        let mut tokens = statement.split_whitespace();
        let ty = loop {
            let token = tokens.next()?;
            match token {
                "in" if direction.is_none() => direction = Some(Direction::In),
                "out" if direction.is_none() => direction = Some(Direction::Out),
                _ if PRECISION_QUALIFIERS.contains(&token) => {}
                _ if INTERPOLATION_QUALIFIERS.contains(&token) => {
                    qualifiers.push(token.to_string())
                }
                _ => break token,
            }
        };
        let direction = direction?;
        if !is_identifier(ty) {
            return None;
        }
        let names: Vec<String> = tokens
            .collect::<String>()
            .split(',')
            .map(str::to_string)
            .collect();
        if !names
            .iter()
            .all(|name| is_identifier(base_name(name)))
        {
            return None;
        }

        Some(Self {
            direction,
            location,
            qualifiers,
            ty: ty.to_string(),
            names,
        })
    }

    fn render(&self, name: &str, location: u32) -> String {
        let mut rendered = format!("layout(location = {location}) ");
        for qualifier in &self.qualifiers {
            rendered.push_str(qualifier);
            rendered.push(' ');
        }
        rendered.push_str(&format!("{} {} {name};", self.direction.keyword(), self.ty));
        rendered
    }
}

/// Assigns locations to declarations that lack one and returns the rewritten
/// lines by index, plus the interstage variables of `kind`.
fn place_varyings(
    kind: StageKind,
    declarations: &[(usize, Varying)],
    linked: &BTreeMap<String, u32>,
) -> (BTreeMap<usize, String>, StageVaryings) {
    let interstage = match kind {
        StageKind::Vertex => Direction::Out,
        StageKind::Fragment => Direction::In,
    };
    let linked_location = |varying: &Varying, name: &str| {
        (kind == StageKind::Fragment && varying.direction == interstage)
            .then(|| linked.get(name).copied())
            .flatten()
    };

    let mut used: BTreeMap<Direction, BTreeSet<u32>> = BTreeMap::new();
    for (_, varying) in declarations {
        let taken = used.entry(varying.direction).or_default();
        let mut next = varying.location;
        for name in &varying.names {
            let slots = location_slots(&varying.ty, name);
            let start = match next {
                Some(location) => location,
                None => match linked_location(varying, base_name(name)) {
                    Some(location) => location,
                    None => continue,
                },
            };
            taken.extend(start..start + slots);
            next = next.map(|location| location + slots);
        }
    }

    let mut rendered = BTreeMap::new();
    let mut varyings = StageVaryings::default();
    for (index, varying) in declarations {
        let taken = used.entry(varying.direction).or_default();
        let mut next = varying.location;
        let mut statements = Vec::new();
        for name in &varying.names {
            let slots = location_slots(&varying.ty, name);
            let base = base_name(name);
            let location = match next {
                Some(location) => {
                    next = Some(location + slots);
                    location
                }
                None => {
                    let location = linked_location(varying, base).unwrap_or_else(|| {
                        let location = first_free(taken, slots);
                        taken.extend(location..location + slots);
                        location
                    });
                    statements.push(varying.render(name, location));
                    if varying.direction == interstage {
                        varyings.implicit.insert(base.to_string());
                    }
                    location
                }
            };
            if varying.direction == interstage {
                varyings.locations.insert(base.to_string(), location);
            }
        }
        if varying.location.is_none() {
            rendered.insert(*index, statements.join(" "));
        }
    }
    (rendered, varyings)
}

fn first_free(taken: &BTreeSet<u32>, slots: u32) -> u32 {
    (0u32..)
        .find(|start| (*start..start + slots).all(|location| !taken.contains(&location)))
        .unwrap_or(0)
}

/// Locations a variable of `ty` declared as `name` occupies.
fn location_slots(ty: &str, name: &str) -> u32 {
    let columns = ty
        .strip_prefix("mat")
        .and_then(|dims| dims.chars().next())
        .and_then(|c| c.to_digit(10))
        .unwrap_or(1);
    let elements = name
        .split_once('[')
        .and_then(|(_, count)| count.trim_end_matches(']').trim().parse::<u32>().ok())
        .unwrap_or(1);
    columns * elements.max(1)
}

fn layout_location(arguments: &str) -> Option<u32> {
    arguments.split(',').find_map(|argument| {
        let (key, value) = argument.split_once('=')?;
        (key.trim() == "location").then(|| value.trim().parse().ok())?
    })
}

/// Replacement for a loose declaration of a prelude uniform, or `None` when
/// `line` declares anything else.
///
/// A declaration matching the block member's type is blanked. `bool`, `int`
/// and `float` spellings of a scalar member are redefined as a conversion of
/// the member; any other type is an error.
fn reserved_uniform(kind: StageKind, number: usize, line: &str) -> Result<Option<String>, String> {
    let Some(statement) = strip_comment(line).trim().strip_suffix(';') else {
        return Ok(None);
    };
    let statement = match statement.strip_prefix("layout") {
        Some(rest) => match rest.trim_start().strip_prefix('(').and_then(|r| r.split_once(')')) {
            Some((_, rest)) => rest,
            None => return Ok(None),
        },
        None => statement,
    };
    let mut tokens = statement
        .split_whitespace()
        .filter(|token| !PRECISION_QUALIFIERS.contains(token));
    if tokens.next() != Some("uniform") {
        return Ok(None);
    }
    let (Some(ty), Some(name), None) = (tokens.next(), tokens.next(), tokens.next()) else {
        return Ok(None);
    };
    let name = base_name(name);

    if CelestialBody::ALL
        .iter()
        .any(|body| body.sampler_uniform() == name)
    {
        return Ok(Some(String::new()));
    }
    let Some(uniform) = Uniform::ALL.into_iter().find(|uniform| uniform.name() == name) else {
        return Ok(None);
    };
    let provided = uniform.glsl_type();
    if ty == provided {
        return Ok(Some(String::new()));
    }
    let member = format!("orrery.{BLOCK_PREFIX}{name}");
    let value = match (ty, provided) {
        ("bool", "int") => format!("({member} != 0)"),
        ("bool", "float") => format!("({member} != 0.0)"),
        ("float", "int") => format!("float({member})"),
        ("int", "float") => format!("int({member})"),
        _ => {
            return Err(format!(
                "{kind}.glsl:{number}: `{name}` is a {provided} uniform and cannot be declared as {ty}"
            ))
        }
    };
    Ok(Some(format!(
        "#undef {name}\n#define {name} {value}\n#line {}",
        number + 1
    )))
}

fn strip_comment(line: &str) -> &str {
    line.split_once("//").map_or(line, |(code, _)| code)
}

fn brace_delta(line: &str) -> i32 {
    strip_comment(line).chars().fold(0, |depth, c| match c {
        '{' => depth + 1,
        '}' => depth - 1,
        _ => depth,
    })
}

fn base_name(name: &str) -> &str {
    name.split('[').next().unwrap_or(name).trim()
}

fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Shared by both stages so the block layout always agrees at link time.
const BLOCK_PRELUDE: &str = r"#version 450

layout(std140, set = 0, binding = 0) uniform OrreryParams {
    vec2 _u_resolution;
    vec2 _u_mouse;
    float _u_time;
    float _u_dt;
    float _u_zoom;
    int _u_starMode;
    int _u_orbit;
} orrery;

#define u_resolution orrery._u_resolution
#define u_mouse orrery._u_mouse
#define u_time orrery._u_time
#define u_dt orrery._u_dt
#define u_zoom orrery._u_zoom
#define u_starMode orrery._u_starMode
#define u_orbit orrery._u_orbit

";

fn texture_prelude() -> String {
    let mut prelude = String::new();
    for body in CelestialBody::ALL {
        let name = body.name();
        let binding = body.unit() * 2;
        prelude.push_str(&format!(
            "layout(set = 1, binding = {binding}) uniform texture2D orrery_{name}_texture;\n\
             layout(set = 1, binding = {sampler}) uniform sampler orrery_{name}_sampler;\n\
             #define {uniform} sampler2D(orrery_{name}_texture, orrery_{name}_sampler)\n",
            sampler = binding + 1,
            uniform = body.sampler_uniform(),
        ));
    }
    prelude.push('\n');
    prelude
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const VERTEX: &str = r"#version 300 es
layout(location = 0) in vec2 a_position;
layout(location = 1) in vec2 a_uv;
layout(location = 0) out vec2 v_uv;
void main() {
    v_uv = a_uv;
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

    pub(crate) const FRAGMENT: &str = r"#version 300 es
precision mediump float;
uniform float u_zoom;
uniform sampler2D u_texture_earth;
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 fragColor;
void main() {
    vec4 earth = texture(u_texture_earth, v_uv);
    fragColor = vec4(earth.rgb * u_zoom, 1.0);
}
";

    /// WebGL2-style stages: no location qualifiers, varyings declared in a
    /// different order on each side.
    const PLAIN_VERTEX: &str = r"#version 300 es
in vec2 a_position;
in vec2 a_uv;
out vec2 v_uv;
out float v_shade;
void main() {
    v_uv = a_uv;
    v_shade = a_position.x;
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

    const PLAIN_FRAGMENT: &str = r"#version 300 es
precision highp float;
in float v_shade;
in vec2 v_uv;
out vec4 fragColor;
void main() {
    fragColor = vec4(v_uv, v_shade, 1.0);
}
";

    fn wrap(kind: StageKind, source: &str) -> WrappedStage {
        wrap_stage(kind, source, &BTreeMap::new()).expect("wrap")
    }

    fn link(vertex: &str, fragment: &str) -> Result<ProgramInterface, String> {
        let vs = compile_stage(StageKind::Vertex, vertex)?;
        let fs = compile_stage(StageKind::Fragment, fragment)?;
        link_stages(&vs, &fs).map(|linked| linked.interface)
    }

    #[test]
    fn wrap_blanks_reserved_uniforms_only() {
        let source =
            "#version 300 es\nuniform float u_time;\nuniform vec3 u_tint;\nvoid main() {}\n";
        let wrapped = wrap(StageKind::Fragment, source);
        assert!(!wrapped.text.contains("uniform float u_time;"));
        assert!(wrapped.text.contains("uniform vec3 u_tint;"));
        assert!(wrapped.text.contains("#define u_texture_stars"));
        assert_eq!(wrapped.text.matches("#version").count(), 1);

        let (_, body) = wrapped.text.split_once("#line 1\n").expect("line directive");
        assert_eq!(body.lines().count(), source.lines().count());
        assert_eq!(body.lines().nth(2), Some("uniform vec3 u_tint;"));
    }

    #[test]
    fn vertex_prelude_has_no_textures() {
        let wrapped = wrap(StageKind::Vertex, "void main() {}\n");
        assert!(wrapped.text.contains("OrreryParams"));
        assert!(!wrapped.text.contains("texture2D"));
    }

    #[test]
    fn syntax_error_log_names_the_stage() {
        let err = compile_stage(StageKind::Fragment, "void main() { this is not glsl }")
            .expect_err("must fail");
        assert!(err.contains("fragment.glsl"), "{err}");
        assert!(!err.contains("wgsl"), "{err}");
    }

    #[test]
    fn reflects_active_inputs() {
        let interface = link(VERTEX, FRAGMENT).expect("link");
        assert_eq!(interface.attribute_location("a_position"), Some(0));
        assert_eq!(interface.attribute_location("a_uv"), Some(1));
        assert_eq!(
            interface.uniform_location("u_texture_earth"),
            Some(UniformLocation::Sampler { slot: 0 })
        );
        assert_eq!(
            interface.uniform_location("u_zoom"),
            Some(UniformLocation::Block { offset: 24 })
        );
        assert_eq!(interface.uniform_location("u_time"), None);
        assert_eq!(interface.uniform_location("u_texture_mars"), None);
        assert!(interface.uniform_block_size >= 36);
    }

    #[test]
    fn uniform_read_from_a_helper_function_is_active() {
        let fragment = r"
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 fragColor;
float pulse() { return sin(u_time); }
void main() { fragColor = vec4(v_uv, pulse(), 1.0); }
";
        let interface = link(VERTEX, fragment).expect("link");
        assert_eq!(
            interface.uniform_location("u_time"),
            Some(UniformLocation::Block { offset: 16 })
        );
        assert_eq!(interface.uniform_location("u_zoom"), None);
        assert_eq!(interface.uniform_location("u_mouse"), None);
        assert_eq!(interface.uniform_location("u_resolution"), None);
    }

    #[test]
    fn unqualified_declarations_get_locations_in_order() {
        let wrapped = wrap(
            StageKind::Vertex,
            "in vec2 a_position;\nlayout(location = 0) in vec2 a_uv;\nout highp vec2 v_uv;\nvoid main() {}\n",
        );
        assert!(wrapped
            .text
            .contains("layout(location = 1) in vec2 a_position;"));
        assert!(wrapped.text.contains("layout(location = 0) out vec2 v_uv;"));
        assert_eq!(wrapped.varyings.locations.get("v_uv"), Some(&0));
        assert!(wrapped.varyings.implicit.contains("v_uv"));
    }

    #[test]
    fn plain_varyings_match_by_name() {
        let vs = compile_stage(StageKind::Vertex, PLAIN_VERTEX).expect("vertex");
        let fs = compile_stage(StageKind::Fragment, PLAIN_FRAGMENT).expect("fragment");
        assert_eq!(fs.varyings.locations.get("v_shade"), Some(&0));

        let linked = link_stages(&vs, &fs).expect("link");
        let relocated = linked.relocated_fragment.expect("fragment rebuilt");
        assert_eq!(relocated.varyings.locations.get("v_uv"), Some(&0));
        assert_eq!(relocated.varyings.locations.get("v_shade"), Some(&1));
        assert_eq!(linked.interface.attribute_location("a_position"), Some(0));
        assert_eq!(linked.interface.attribute_location("a_uv"), Some(1));
    }

    #[test]
    fn explicit_locations_need_no_rebuild() {
        let vs = compile_stage(StageKind::Vertex, VERTEX).expect("vertex");
        let fs = compile_stage(StageKind::Fragment, FRAGMENT).expect("fragment");
        let linked = link_stages(&vs, &fs).expect("link");
        assert!(linked.relocated_fragment.is_none());
    }

    #[test]
    fn plain_varying_without_a_writer_fails_link() {
        let fragment = r"
in vec2 v_texcoord;
out vec4 fragColor;
void main() { fragColor = vec4(v_texcoord, 0.0, 1.0); }
";
        let err = link(PLAIN_VERTEX, fragment).expect_err("must fail");
        assert!(err.contains("v_texcoord"), "{err}");
    }

    #[test]
    fn layout_qualified_reserved_uniform_is_dropped() {
        let fragment = r"
layout(location = 3) uniform highp float u_time;
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 fragColor;
void main() { fragColor = vec4(v_uv, u_time, 1.0); }
";
        let interface = link(VERTEX, fragment).expect("link");
        assert_eq!(
            interface.uniform_location("u_time"),
            Some(UniformLocation::Block { offset: 16 })
        );
    }

    #[test]
    fn bool_spelling_of_an_int_uniform_reads_the_member() {
        let fragment = r"
uniform bool u_orbit;
in vec2 v_uv;
out vec4 fragColor;
void main() {
    if (u_orbit) {
        fragColor = vec4(v_uv, 0.0, 1.0);
    } else {
        fragColor = vec4(0.0);
    }
}
";
        let interface = link(VERTEX, fragment).expect("link");
        assert_eq!(
            interface.uniform_location("u_orbit"),
            Some(UniformLocation::Block { offset: 32 })
        );
        assert_eq!(interface.uniform_location("u_starMode"), None);
    }

    #[test]
    fn incompatible_reserved_uniform_type_is_reported() {
        let err = compile_stage(
            StageKind::Fragment,
            "uniform vec3 u_time;\nvoid main() {}\n",
        )
        .expect_err("must fail");
        assert!(err.contains("u_time"), "{err}");
        assert!(err.contains("float"), "{err}");
        assert!(err.contains("fragment.glsl:1"), "{err}");
    }

    #[test]
    fn unwritten_fragment_input_fails_link() {
        let fragment = r"
layout(location = 3) in vec2 v_other;
layout(location = 0) out vec4 fragColor;
void main() { fragColor = vec4(v_other, 0.0, 1.0); }
";
        let err = link(VERTEX, fragment).expect_err("must fail");
        assert!(err.contains("location 3"), "{err}");
    }

    #[test]
    fn swapped_stages_fail_link() {
        let vs = compile_stage(StageKind::Vertex, VERTEX).expect("vertex");
        let err = link_stages(&vs, &vs).expect_err("must fail");
        assert!(err.contains("fragment"));
    }
}
