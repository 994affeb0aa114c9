//! Baseline turn generator.
//!
//! Draws a meandering polyline that picks up near where the previous
//! fragment left off. Exists so the engine can be exercised end to end
//! without the real model service, and doubles as the test generator.

use crate::{GeneratedTurn, GenerationError, GenerationRequest, TurnGenerator};
use cadavre_engine::game::Canvas;
use rand::Rng;
use serde_json::json;

const MIN_POINTS: usize = 4;
const MAX_POINTS: usize = 12;

const INTERPRETATIONS: &[&str] = &[
    "a river finding its way",
    "the back of some animal",
    "a horizon, probably",
    "tangled string",
    "a limb reaching downward",
];

#[derive(Debug, Clone, Default)]
pub struct ScribbleGenerator;

impl ScribbleGenerator {
    pub fn new() -> Self {
        Self
    }

    fn scribble(&self, canvas: Canvas, request: &GenerationRequest) -> serde_json::Value {
        let mut rng = rand::rng();
        let (mut x, mut y) = start_point(&mut rng, canvas, request);

        let count = rng.random_range(MIN_POINTS..=MAX_POINTS);
        let step_x = (canvas.width / 8).max(1) as i64;
        let step_y = (canvas.height / 8).max(1) as i64;

        let mut points = Vec::with_capacity(count);
        points.push([x, y]);
        for _ in 1..count {
            x = (x + rng.random_range(-step_x..=step_x)).clamp(0, canvas.width as i64);
            y = (y + rng.random_range(-step_y..=step_y)).clamp(0, canvas.height as i64);
            points.push([x, y]);
        }

        json!({
            "kind": "path",
            "points": points,
            "stroke": { "width": 2, "color": "#1a1a1a" },
        })
    }
}

/// Continue from the last point of the previous fragment when one exists,
/// otherwise start somewhere in the middle third of the canvas.
fn start_point<R: Rng>(rng: &mut R, canvas: Canvas, request: &GenerationRequest) -> (i64, i64) {
    let previous = request
        .turns
        .last()
        .and_then(|turn| turn.data.get("points"))
        .and_then(|points| points.as_array())
        .and_then(|points| points.last())
        .and_then(|point| {
            let x = point.get(0)?.as_i64()?;
            let y = point.get(1)?.as_i64()?;
            Some((x, y))
        });

    match previous {
        Some((x, y)) => (
            x.clamp(0, canvas.width as i64),
            y.clamp(0, canvas.height as i64),
        ),
        None => {
            let (w, h) = (canvas.width as i64, canvas.height as i64);
            (
                rng.random_range(w / 3..=2 * w / 3),
                rng.random_range(h / 3..=2 * h / 3),
            )
        }
    }
}

#[async_trait::async_trait]
impl TurnGenerator for ScribbleGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratedTurn, GenerationError> {
        let canvas = request.canvas;
        if canvas.width == 0 || canvas.height == 0 {
            return Err(GenerationError::ServiceFailure(
                "degenerate canvas".to_string(),
            ));
        }

        let data = self.scribble(canvas, &request);
        let interpretation = {
            let mut rng = rand::rng();
            INTERPRETATIONS[rng.random_range(0..INTERPRETATIONS.len())].to_string()
        };

        Ok(GeneratedTurn {
            data,
            interpretation: Some(interpretation),
            reasoning: Some(format!(
                "continued from turn {} of {}",
                request.turn_number.saturating_sub(1),
                request.turn_number
            )),
        })
    }

    fn name(&self) -> &str {
        "scribble"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadavre_engine::turn::Turn;
    use serde_json::json;

    fn request(turns: Vec<Turn>) -> GenerationRequest {
        GenerationRequest {
            session_id: "ABCDE".into(),
            canvas: Canvas {
                width: 400,
                height: 300,
            },
            turns,
            turn_number: 1,
        }
    }

    #[tokio::test]
    async fn generates_points_inside_the_canvas() {
        let generator = ScribbleGenerator::new();
        let generated = generator.generate(request(Vec::new())).await.unwrap();

        let points = generated.data["points"].as_array().unwrap();
        assert!(points.len() >= MIN_POINTS);
        for point in points {
            let x = point[0].as_i64().unwrap();
            let y = point[1].as_i64().unwrap();
            assert!((0..=400).contains(&x));
            assert!((0..=300).contains(&y));
        }
        assert!(generated.interpretation.is_some());
    }

    #[tokio::test]
    async fn continues_from_previous_fragment() {
        let previous = Turn::by_user(0, "p1".into(), json!({"points": [[10, 20], [42, 24]]}));
        let generator = ScribbleGenerator::new();
        let generated = generator.generate(request(vec![previous])).await.unwrap();

        let first = generated.data["points"].as_array().unwrap()[0].clone();
        assert_eq!(first[0].as_i64().unwrap(), 42);
        assert_eq!(first[1].as_i64().unwrap(), 24);
    }

    #[tokio::test]
    async fn rejects_degenerate_canvas() {
        let generator = ScribbleGenerator::new();
        let mut req = request(Vec::new());
        req.canvas = Canvas {
            width: 0,
            height: 0,
        };
        assert!(matches!(
            generator.generate(req).await,
            Err(GenerationError::ServiceFailure(_))
        ));
    }
}
