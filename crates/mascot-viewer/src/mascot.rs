//! Built-in demo character, drawn from a procedural atlas.

use glam::Vec2;
use mascot_engine::model::{
    BlendMode, MeshGeometry, MeshModel, MeshPart, ModelError, Motion, TextureImage,
};

const ATLAS: u32 = 128;
const CELL: u32 = ATLAS / 2;

/// Atlas cells, as UV rectangles.
#[derive(Copy, Clone)]
enum Cell {
    Skin,
    Hair,
    EyeWhite,
    Iris,
}

impl Cell {
    fn uv(self) -> (Vec2, Vec2) {
        let (cx, cy) = match self {
            Cell::Skin => (0.0, 0.0),
            Cell::Hair => (0.5, 0.0),
            Cell::EyeWhite => (0.0, 0.5),
            Cell::Iris => (0.5, 0.5),
        };
        (Vec2::new(cx, cy), Vec2::new(cx + 0.5, cy + 0.5))
    }
}

fn premultiply([r, g, b]: [u8; 3], a: f32) -> [u8; 4] {
    let a = a.clamp(0.0, 1.0);
    let m = |c: u8| (c as f32 * a).round() as u8;
    [m(r), m(g), m(b), (a * 255.0).round() as u8]
}

fn atlas() -> TextureImage {
    TextureImage::from_fn(ATLAS, ATLAS, |x, y| {
        let (col, row) = (x / CELL, y / CELL);
        // Position inside the cell, in -1..1.
        let u = (x % CELL) as f32 / (CELL - 1) as f32 * 2.0 - 1.0;
        let v = (y % CELL) as f32 / (CELL - 1) as f32 * 2.0 - 1.0;
        let r = (u * u + v * v).sqrt();

        match (col, row) {
            (0, 0) => {
                let shade = 1.0 - 0.12 * v.max(0.0);
                premultiply(
                    [(250.0 * shade) as u8, (222.0 * shade) as u8, (205.0 * shade) as u8],
                    1.0,
                )
            }
            (1, 0) => {
                let streak = 0.85 + 0.15 * (u * 9.0).sin();
                premultiply([(92.0 * streak) as u8, (58.0 * streak) as u8, (120.0 * streak) as u8], 1.0)
            }
            (0, 1) => premultiply([252, 252, 255], 1.0),
            _ => {
                if r < 0.35 {
                    premultiply([20, 16, 34], 1.0)
                } else {
                    let t = ((r - 0.35) / 0.65).min(1.0);
                    let c = |a: f32, b: f32| (a + (b - a) * t) as u8;
                    premultiply([c(120.0, 40.0), c(200.0, 90.0), c(235.0, 160.0)], 1.0)
                }
            }
        }
    })
}

fn ellipse(center: Vec2, radii: Vec2, cell: Cell) -> MeshGeometry {
    let (uv_min, uv_max) = cell.uv();
    MeshGeometry::ellipse(center, radii, 40, uv_min, uv_max)
}

fn quad(min: Vec2, max: Vec2, cell: Cell) -> MeshGeometry {
    let (uv_min, uv_max) = cell.uv();
    MeshGeometry::quad(min, max, uv_min, uv_max)
}

fn eye(side: &str, x: f32) -> [MeshPart; 2] {
    let white = format!("eye_white_{side}");
    let blink = Motion::Blink {
        interval: 4.2,
        duration: 0.16,
    };
    [
        MeshPart::new(&white, ellipse(Vec2::new(x, 0.12), Vec2::new(0.1, 0.075), Cell::EyeWhite))
            .motion(blink),
        // The iris wanders inside the eye white and is clipped to it, so it
        // also disappears while the eye is closed.
        MeshPart::new(
            format!("iris_{side}"),
            ellipse(Vec2::new(x, 0.11), Vec2::new(0.06, 0.065), Cell::Iris),
        )
        .masked_by(white)
        .motion(Motion::Sway {
            amplitude: Vec2::new(0.035, 0.01),
            period: 6.0,
            phase: 0.0,
        }),
    ]
}

/// Builds the demo character. Everything lives in one atlas page.
pub fn build() -> Result<MeshModel, ModelError> {
    let breathe = Motion::Breathe {
        amount: 0.015,
        period: 3.5,
    };
    let sway = |phase| Motion::Sway {
        amplitude: Vec2::new(0.012, 0.0),
        period: 5.0,
        phase,
    };

    let [white_l, iris_l] = eye("l", -0.19);
    let [white_r, iris_r] = eye("r", 0.19);

    MeshModel::builder()
        .texture(atlas())
        .part(
            MeshPart::new("hair_back", ellipse(Vec2::new(0.0, 0.12), Vec2::new(0.62, 0.7), Cell::Hair))
                .motion(sway(0.1)),
        )
        .part(
            MeshPart::new("body", quad(Vec2::new(-0.36, -1.0), Vec2::new(0.36, -0.42), Cell::Hair))
                .pivot(Vec2::new(0.0, -1.0))
                .motion(breathe),
        )
        .part(
            MeshPart::new("neck", quad(Vec2::new(-0.09, -0.52), Vec2::new(0.09, -0.3), Cell::Skin))
                .motion(breathe),
        )
        .part(
            MeshPart::new("face", ellipse(Vec2::new(0.0, 0.05), Vec2::new(0.48, 0.52), Cell::Skin))
                .motion(sway(0.0)),
        )
        .part(white_l)
        .part(iris_l)
        .part(white_r)
        .part(iris_r)
        .part(
            MeshPart::new("cheeks", ellipse(Vec2::new(0.0, -0.1), Vec2::new(0.32, 0.06), Cell::Hair))
                .blend(BlendMode::Additive)
                .opacity(0.25)
                .motion(Motion::Pulse {
                    min: 0.1,
                    max: 0.3,
                    period: 7.0,
                }),
        )
        .part(
            MeshPart::new("shadow", quad(Vec2::new(-0.48, 0.22), Vec2::new(0.48, 0.3), Cell::Skin))
                .blend(BlendMode::Multiplicative)
                .opacity(0.5),
        )
        .part(
            MeshPart::new("fringe", ellipse(Vec2::new(0.0, 0.48), Vec2::new(0.52, 0.2), Cell::Hair))
                .render_order(100)
                .motion(sway(0.05)),
        )
        .build()
}
