//! Translation-key lookup. The core only ever picks keys; text is resolved here
//! at the HTTP boundary.

use axum::http::HeaderMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
    #[default]
    Es,
    En,
}

impl Lang {
    /// Parses a language tag such as `en`, `en-US` or an `Accept-Language` list.
    /// Anything unsupported falls back to Spanish.
    pub fn parse(tag: &str) -> Self {
        let primary = tag
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
            .get(..2)
            .unwrap_or_default()
            .to_ascii_lowercase();
        match primary.as_str() {
            "en" => Lang::En,
            _ => Lang::Es,
        }
    }

    /// `?lang=` wins over `Accept-Language`.
    pub fn from_request(headers: &HeaderMap, query_lang: Option<&str>) -> Self {
        if let Some(lang) = query_lang.filter(|l| !l.is_empty()) {
            return Self::parse(lang);
        }
        headers
            .get(axum::http::header::ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok())
            .map(Self::parse)
            .unwrap_or_default()
    }
}

/// Resolves a key; unknown keys come back unchanged.
pub fn translate(key: &str, lang: Lang) -> String {
    match lookup(key) {
        Some((es, en)) => match lang {
            Lang::Es => es.to_string(),
            Lang::En => en.to_string(),
        },
        None => key.to_string(),
    }
}

fn lookup(key: &str) -> Option<(&'static str, &'static str)> {
    let pair = match key {
        // errors
        "errors.notFound" => ("Recurso no encontrado", "Resource not found"),
        "errors.badRequest" => ("Solicitud inválida", "Bad request"),
        "errors.validation" => ("Error de validación", "Validation error"),
        "errors.forbidden" => ("No tienes permiso para esta acción", "You are not allowed to do this"),
        "errors.unauthorized" => ("No autenticado", "Not authenticated"),
        "errors.internal" => ("Error interno del servidor", "Internal server error"),
        "validation.required" => ("Faltan campos obligatorios", "Required fields are missing"),
        "validation.invalidFormat" => ("Formato inválido", "Invalid format"),
        "user.notFound" => ("Usuario no encontrado", "User not found"),
        "golfer.notFound" => ("Golfista no encontrado", "Golfer not found"),
        "club.notFound" => ("Club no encontrado", "Club not found"),
        "caddie.notFound" => ("Caddie no encontrado", "Caddie not found"),
        "caddie.pending" => ("El caddie aún no fue aprobado", "The caddie has not been approved yet"),
        "caddie.notAvailable" => ("El caddie no está disponible en ese horario", "The caddie is not available at that time"),
        "availability.invalidSlot" => ("Franja horaria inválida", "Invalid time slot"),
        "availability.invalidDay" => ("Día de la semana inválido", "Invalid day of week"),
        "booking.notFound" => ("Reserva no encontrada", "Booking not found"),
        "booking.invalidTime" => ("Formato de hora inválido. Use HH:mm (ej: 10:00)", "Invalid time format. Use HH:mm (e.g. 10:00)"),
        "booking.invalidTimeRange" => ("La hora de fin debe ser posterior a la hora de inicio", "End time must be after start time"),
        "booking.alreadyBooked" => ("El caddie ya tiene una reserva en ese horario", "The caddie already has a booking at that time"),
        "booking.invalidStatus" => ("La reserva no admite esta acción en su estado actual", "The booking does not allow this action in its current state"),
        "booking.cannotCancel" => ("La reserva ya no puede cancelarse", "The booking can no longer be cancelled"),
        "booking.invalidQR" => ("Código QR inválido", "Invalid QR code"),
        "booking.qrMismatch" => ("El código QR no corresponde a esta reserva", "The QR code does not belong to this booking"),
        "booking.qrInvalidTimestamp" => ("El QR no contiene un timestamp válido", "The QR code has no valid timestamp"),
        "booking.qrDateMismatch" => ("El código QR no corresponde a la fecha de esta reserva", "The QR code does not match this booking's date"),
        "rating.invalid" => ("La calificación debe estar entre 1 y 5", "Rating must be between 1 and 5"),
        "rating.alreadyRated" => ("Esta reserva ya fue calificada", "This booking has already been rated"),
        "payment.notFound" => ("Pago no encontrado", "Payment not found"),
        "payment.bookingNotAccepted" => ("La reserva debe estar aceptada para pagar", "The booking must be accepted before paying"),
        "payment.alreadyPaid" => ("La reserva ya fue pagada", "The booking has already been paid"),
        "payment.notCompleted" => ("El pago no está completado", "The payment is not completed"),
        "payment.alreadyLiquidated" => ("El pago ya fue liquidado", "The payment has already been settled"),
        "payment.creationFailed" => ("No se pudo crear el pago", "The payment could not be created"),
        // success
        "booking.created" => ("Reserva creada", "Booking created"),
        "booking.accepted" => ("Reserva aceptada", "Booking accepted"),
        "booking.rejected" => ("Reserva rechazada", "Booking rejected"),
        "booking.started" => ("Servicio iniciado", "Service started"),
        "booking.completed" => ("Servicio completado", "Service completed"),
        "booking.cancelled" => ("Reserva cancelada", "Booking cancelled"),
        "payment.created" => ("Pago creado", "Payment created"),
        "payment.liquidated" => ("Pago liquidado", "Payment settled"),
        "common.updated" => ("Actualizado correctamente", "Updated successfully"),
        "common.success" => ("Operación exitosa", "Success"),
        _ => return None,
    };
    Some(pair)
}
