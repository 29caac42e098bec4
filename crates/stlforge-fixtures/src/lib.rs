//! Small STEP documents built with the truck modeler.
//!
//! Dev-only: used by tests across the workspace, never linked into the
//! library or the binary. Real parts come from CAD exports.

use truck_modeling::{builder, Point3, Rad, Solid, Vector3};
use truck_stepio::out;

/// An axis-aligned box with its minimum corner at `origin`.
pub fn box_step(origin: [f64; 3], size: [f64; 3]) -> String {
    let vertex = builder::vertex(Point3::new(origin[0], origin[1], origin[2]));
    let edge = builder::tsweep(&vertex, size[2] * Vector3::unit_z());
    let face = builder::tsweep(&edge, size[0] * Vector3::unit_x());
    let solid: Solid = builder::tsweep(&face, size[1] * Vector3::unit_y());
    solid_to_step(&solid, "box")
}

/// A cylinder along +Z with its base centred on the origin.
///
/// Returns `None` if the modeler cannot close the base disk.
pub fn cylinder_step(radius: f64, height: f64) -> Option<String> {
    let vertex = builder::vertex(Point3::new(radius, 0.0, 0.0));
    let circle = builder::rsweep(
        &vertex,
        Point3::new(0.0, 0.0, 0.0),
        Vector3::unit_z(),
        Rad(7.0),
    );
    let disk = builder::try_attach_plane(&[circle]).ok()?;
    let solid: Solid = builder::tsweep(&disk, height * Vector3::unit_z());
    Some(solid_to_step(&solid, "cylinder"))
}

fn solid_to_step(solid: &Solid, name: &str) -> String {
    let compressed = solid.compress();
    let header = out::StepHeaderDescriptor {
        file_name: format!("{name}.step"),
        organization_system: "stlforge fixtures".to_string(),
        ..Default::default()
    };
    out::CompleteStepDisplay::new(out::StepModel::from(&compressed), header).to_string()
}

/// Concatenate the DATA sections of several documents into one.
///
/// Entity ids of each later document are shifted past the ids already
/// used, so shells keep the order of `docs`.
pub fn merge_documents(docs: &[String]) -> String {
    let Some(first) = docs.first() else {
        return String::new();
    };
    let (header, _) = split_data(first);

    let mut data = String::new();
    let mut offset = 0u64;
    for doc in docs {
        let (_, body) = split_data(doc);
        let (shifted, max_id) = shift_ids(body, offset);
        data.push_str(&shifted);
        data.push('\n');
        offset += max_id;
    }

    format!("{header}DATA;\n{data}ENDSEC;\nEND-ISO-10303-21;\n")
}

/// A `outer`-sized cube with a centred cubic cavity of edge `inner`,
/// written as one `BREP_WITH_VOIDS` solid whose void is an
/// `ORIENTED_CLOSED_SHELL(.., .F.)` over the inner box shell.
pub fn hollow_box_step(outer: f64, inner: f64) -> String {
    let offset = (outer - inner) / 2.0;
    let merged = merge_documents(&[
        box_step([0.0; 3], [outer; 3]),
        box_step([offset; 3], [inner; 3]),
    ]);
    let shells = shell_ids(&merged);
    let (outer_shell, inner_shell) = (shells[0], shells[1]);
    let next = max_entity_id(&merged) + 1;
    append_entities(
        &merged,
        &[
            format!("#{next} = ORIENTED_CLOSED_SHELL('',*,#{inner_shell},.F.);"),
            format!(
                "#{} = BREP_WITH_VOIDS('hollow',#{outer_shell},(#{next}));",
                next + 1
            ),
        ],
    )
}

/// `doc` plus an `ITEM_DEFINED_TRANSFORMATION` between a placement at the
/// origin and one at `offset`. A zero offset is the identity.
pub fn with_item_transform(doc: &str, offset: [f64; 3]) -> String {
    let n = max_entity_id(doc) + 1;
    let mut entities = placements(n, offset);
    entities.push(format!(
        "#{} = ITEM_DEFINED_TRANSFORMATION('','',#{},#{});",
        n + 4,
        n + 2,
        n + 3
    ));
    append_entities(doc, &entities)
}

/// `doc` plus a `MAPPED_ITEM` whose map origin is at the origin and whose
/// target placement is at `offset`.
pub fn with_mapped_item(doc: &str, offset: [f64; 3]) -> String {
    let n = max_entity_id(doc) + 1;
    let shell = shell_ids(doc).first().copied().unwrap_or(1);
    let mut entities = placements(n, offset);
    entities.push(format!("#{} = REPRESENTATION_MAP(#{},#{shell});", n + 4, n + 2));
    entities.push(format!("#{} = MAPPED_ITEM('',#{},#{});", n + 5, n + 4, n + 3));
    append_entities(doc, &entities)
}

/// Two points and two default-axis placements, ids `n..n+4`.
fn placements(n: u64, [x, y, z]: [f64; 3]) -> Vec<String> {
    vec![
        format!("#{n} = CARTESIAN_POINT('',(0.0,0.0,0.0));"),
        format!("#{} = CARTESIAN_POINT('',({x:?},{y:?},{z:?}));", n + 1),
        format!("#{} = AXIS2_PLACEMENT_3D('',#{n},$,$);", n + 2),
        format!("#{} = AXIS2_PLACEMENT_3D('',#{},$,$);", n + 3, n + 1),
    ]
}

/// Insert entity lines at the end of the DATA section.
pub fn append_entities(doc: &str, entities: &[String]) -> String {
    let (header, body) = split_data(doc);
    let mut data = body.trim_end().to_string();
    for entity in entities {
        data.push('\n');
        data.push_str(entity);
    }
    format!("{header}DATA;{data}\nENDSEC;\nEND-ISO-10303-21;\n")
}

/// Largest entity id in the DATA section.
pub fn max_entity_id(doc: &str) -> u64 {
    shift_ids(split_data(doc).1, 0).1
}

/// Ids of `CLOSED_SHELL` instances (or `OPEN_SHELL` if there are none), ascending.
pub fn shell_ids(doc: &str) -> Vec<u64> {
    let body = split_data(doc).1;
    let find = |type_name: &str| -> Vec<u64> {
        let mut ids: Vec<u64> = body
            .split(';')
            .filter_map(|statement| {
                let (lhs, rhs) = statement.split_once('=')?;
                let id = lhs.trim().strip_prefix('#')?.parse().ok()?;
                let rhs = rhs.trim_start();
                let name = rhs.split(|c: char| c == '(' || c.is_whitespace()).next()?;
                (name == type_name).then_some(id)
            })
            .collect();
        ids.sort_unstable();
        ids
    };
    let closed = find("CLOSED_SHELL");
    if closed.is_empty() {
        find("OPEN_SHELL")
    } else {
        closed
    }
}

/// Split a document into (everything before `DATA;`, DATA body).
fn split_data(doc: &str) -> (&str, &str) {
    let Some(start) = doc.find("DATA;") else {
        return (doc, "");
    };
    let body_start = start + "DATA;".len();
    let body_end = doc[body_start..]
        .find("ENDSEC;")
        .map_or(doc.len(), |i| body_start + i);
    (&doc[..start], &doc[body_start..body_end])
}

/// Add `offset` to every `#id` outside string literals. Returns the
/// rewritten text and the largest unshifted id seen.
fn shift_ids(body: &str, offset: u64) -> (String, u64) {
    let mut out = String::with_capacity(body.len() + body.len() / 8);
    let mut max_id = 0;
    let mut in_string = false;
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\'' {
            in_string = !in_string;
            out.push(c);
            continue;
        }
        if c != '#' || in_string {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(d);
            chars.next();
        }
        out.push('#');
        match digits.parse::<u64>() {
            Ok(id) => {
                max_id = max_id.max(id);
                out.push_str(&(id + offset).to_string());
            }
            Err(_) => out.push_str(&digits),
        }
    }
    (out, max_id)
}
